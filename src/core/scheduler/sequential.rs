//! FIFO queue drained one task at a time by pool jobs.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::core::handler::Task;

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    draining: bool,
}

/// Task queue for SEQUENTIAL schedulers.
///
/// At most one drain job is scheduled at a time; the drain job runs one task
/// and resubmits itself while tasks remain, so a SEQUENTIAL scheduler never
/// monopolizes a pool worker.
#[derive(Default)]
pub(crate) struct SequentialQueue {
    state: Mutex<QueueState>,
}

impl SequentialQueue {
    /// Enqueue a task. Returns true when the caller must schedule a drain.
    pub(crate) fn push(&self, task: Task) -> bool {
        let mut state = self.state.lock();
        state.tasks.push_back(task);
        if state.draining {
            false
        } else {
            state.draining = true;
            true
        }
    }

    pub(crate) fn pop(&self) -> Option<Task> {
        self.state.lock().tasks.pop_front()
    }

    /// Called by the drain job after each task. Clears the draining flag once empty.
    pub(crate) fn continue_draining(&self) -> bool {
        let mut state = self.state.lock();
        if state.tasks.is_empty() {
            state.draining = false;
            false
        } else {
            true
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn only_first_push_requests_a_drain() {
        let queue = SequentialQueue::default();
        let ran = Arc::new(AtomicUsize::new(0));
        let task = |ran: &Arc<AtomicUsize>| -> Task {
            let ran = Arc::clone(ran);
            Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(queue.push(task(&ran)));
        assert!(!queue.push(task(&ran)));
        assert_eq!(queue.len(), 2);

        while let Some(next) = queue.pop() {
            next();
            if !queue.continue_draining() {
                break;
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert!(queue.push(task(&ran)));
    }
}
