//! Colored output for CLI reports.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` environment variable and `--color` flag.

use std::io::Write;
use taskloop::TaskStatus;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    /// Write text followed by newline with a specific color and style.
    fn writeln_styled(&mut self, text: &str, color: Option<Color>, bold: bool, dimmed: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold).set_dimmed(dimmed);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Bold section header.
    pub fn header(&mut self, text: &str) {
        self.writeln_styled(text, None, true, false);
    }

    /// Secondary information.
    pub fn dim(&mut self, text: &str) {
        self.writeln_styled(text, None, false, true);
    }

    /// One count per task status, colored by status.
    pub fn status_line(&mut self, status: TaskStatus, count: usize) {
        let color = status_color(status);
        self.writeln_styled(
            &format!("  {:<10} {}", status.as_str(), count),
            Some(color),
            count > 0,
            false,
        );
    }
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Queued => Color::Blue,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Cancelled => Color::Yellow,
        TaskStatus::Timeout => Color::Magenta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_color_flag() {
        if std::env::var_os("NO_COLOR").is_some() {
            return;
        }
        assert_eq!(resolve_color_choice(Some("always")), ColorChoice::Always);
        assert_eq!(resolve_color_choice(Some("never")), ColorChoice::Never);
        assert_eq!(resolve_color_choice(None), ColorChoice::Auto);
    }

    #[test]
    fn test_status_colors_distinct() {
        let colors = [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::Timeout,
        ]
        .map(status_color);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
