use std::collections::VecDeque;

use crate::{Shared, SharedCell};

pub type TaskId = u64;
pub type Task = Box<dyn FnOnce()>;

/// Defers work to a later turn of the host's event loop.
pub trait Scheduler {
    fn schedule(&self, task: Task) -> TaskId;
    /// Cancelling an unknown or already run task does nothing.
    fn cancel(&self, id: TaskId);
}

#[derive(Default)]
struct Queue {
    next_id: TaskId,
    tasks: VecDeque<(TaskId, Task)>,
}

/// A single-threaded macrotask queue the host drains explicitly.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue(Shared<SharedCell<Queue>>);

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().tasks.is_empty()
    }

    /// Runs the oldest task. Returns `false` when there was none.
    pub fn run_next(&self) -> bool {
        let task = self.0.borrow_mut().tasks.pop_front();

        match task {
            Some((id, task)) => {
                tracing::trace!(id, "running task");
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks scheduled by the
    /// tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) -> TaskId {
        let mut queue = self.0.borrow_mut();
        queue.next_id += 1;
        let id = queue.next_id;
        queue.tasks.push_back((id, task));
        id
    }

    fn cancel(&self, id: TaskId) {
        self.0.borrow_mut().tasks.retain(|(task_id, _)| *task_id != id);
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_runs_in_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = Rc::clone(&log);
            queue.schedule(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel() {
        let queue = TaskQueue::new();
        let ran = Rc::new(RefCell::new(false));

        let flag = Rc::clone(&ran);
        let id = queue.schedule(Box::new(move || *flag.borrow_mut() = true));
        queue.cancel(id);
        queue.cancel(id + 100);

        assert_eq!(queue.run_pending(), 0);
        assert!(!*ran.borrow());
    }

    #[test]
    fn test_tasks_scheduled_while_running() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_queue = queue.clone();
        let inner_log = Rc::clone(&log);
        queue.schedule(Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let log = Rc::clone(&inner_log);
            inner_queue.schedule(Box::new(move || log.borrow_mut().push("inner")));
        }));

        assert!(queue.run_next());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }
}
