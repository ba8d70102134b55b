use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::task::Task;

/// FIFO of pending [Task]s shared between every caller thread and the single worker thread.
/// Appending signals the worker's condvar; nothing here reorders tasks, so the worker always sees
/// them in submission order and can safely stop batching at the first task whose `scan` fails.
pub struct TaskQueue {
    state: Mutex<VecDeque<Task>>,
    signal: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue {
            state: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        let mut queue = self.state.lock().unwrap();
        queue.push_back(task);
        self.signal.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until at least one task is queued or `timeout` elapses, then hands back whatever
    /// (possibly nothing) has accumulated. The timeout lets the worker poll shutdown state
    /// periodically instead of blocking forever on an empty queue.
    pub fn wait_and_take_timeout(&self, timeout: std::time::Duration) -> VecDeque<Task> {
        let mut queue = self.state.lock().unwrap();
        if queue.is_empty() {
            let (guard, _) = self.signal.wait_timeout(queue, timeout).unwrap();
            queue = guard;
        }
        std::mem::take(&mut queue)
    }

    /// Pushes tasks back onto the front of the queue, in order, ahead of anything appended since
    /// they were taken. Used by the worker to return tasks it pulled but could not fit in the
    /// current batch (the first `scan` failure and everything after it).
    pub fn requeue_front(&self, mut leftover: VecDeque<Task>) {
        if leftover.is_empty() {
            return;
        }
        let mut queue = self.state.lock().unwrap();
        while let Some(task) = leftover.pop_back() {
            queue.push_front(task);
        }
        if !queue.is_empty() {
            self.signal.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SignalSemaphore;
    use smallvec::SmallVec;

    fn noop_task() -> Task {
        Task::SignalSemaphore(SignalSemaphore {
            semaphores: SmallVec::new(),
        })
    }

    #[test]
    fn push_then_take_preserves_order() {
        let queue = TaskQueue::new();
        queue.push(noop_task());
        queue.push(noop_task());
        let taken = queue.wait_and_take_timeout(std::time::Duration::from_secs(1));
        assert_eq!(taken.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_and_take_timeout_returns_empty_when_idle() {
        let queue = TaskQueue::new();
        let taken = queue.wait_and_take_timeout(std::time::Duration::from_millis(5));
        assert!(taken.is_empty());
    }

    #[test]
    fn requeue_front_restores_order_ahead_of_new_pushes() {
        let queue = TaskQueue::new();
        let mut leftover = VecDeque::new();
        leftover.push_back(noop_task());
        leftover.push_back(noop_task());
        queue.requeue_front(leftover);
        queue.push(noop_task());
        assert_eq!(queue.len(), 3);
    }
}
