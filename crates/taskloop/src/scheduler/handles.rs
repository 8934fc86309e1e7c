//! Handle table: task id → abort handle of the in-flight work
//!
//! Lives on the loop thread only (it is neither `Send` nor `Sync` behind
//! its `Rc`). Other threads reach it through `Command::Cancel`.

use crate::scheduler::task::TaskId;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use tokio::task::AbortHandle;

#[derive(Default)]
pub(crate) struct TaskHandleTable {
    handles: RefCell<FxHashMap<TaskId, AbortHandle>>,
}

impl TaskHandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: TaskId, handle: AbortHandle) {
        self.handles.borrow_mut().insert(id, handle);
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<AbortHandle> {
        self.handles.borrow_mut().remove(&id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.handles.borrow().contains_key(&id)
    }

    /// Take every handle, leaving the table empty
    pub(crate) fn drain(&self) -> Vec<(TaskId, AbortHandle)> {
        self.handles.borrow_mut().drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_insert_remove_drain() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let table = TaskHandleTable::new();
            let a = TaskId::new();
            let b = TaskId::new();

            let ja = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
            let jb = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
            table.insert(a, ja.abort_handle());
            table.insert(b, jb.abort_handle());
            assert_eq!(table.len(), 2);
            assert!(table.contains(a));

            let handle = table.remove(a).unwrap();
            handle.abort();
            assert!(ja.await.unwrap_err().is_cancelled());
            assert!(!table.contains(a));
            assert!(table.remove(a).is_none());

            let rest = table.drain();
            assert_eq!(rest.len(), 1);
            assert_eq!(rest[0].0, b);
            assert_eq!(table.len(), 0);
            rest[0].1.abort();
        });
    }
}
