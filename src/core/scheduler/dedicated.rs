//! Dedicated thread for SEQUENTIAL_THREAD schedulers.

use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::core::handler::Task;
use crate::core::worker_pool::PoolError;
use crate::core::WiringError;

use super::SchedulerCore;

/// Unbounded channel plus the detached thread that drains it.
///
/// Tasks sent before `start` wait in the channel. After `stop` the sender is
/// dropped; the thread finishes what is queued and exits.
pub(crate) struct DedicatedThread {
    task_tx: Mutex<Option<Sender<Task>>>,
    task_rx: Mutex<Option<Receiver<Task>>>,
}

impl DedicatedThread {
    pub(crate) fn new() -> Self {
        let (task_tx, task_rx) = unbounded();
        Self {
            task_tx: Mutex::new(Some(task_tx)),
            task_rx: Mutex::new(Some(task_rx)),
        }
    }

    /// Queue a task; hands it back once stopped.
    pub(crate) fn send(&self, task: Task) -> Result<(), Task> {
        match self.task_tx.lock().as_ref() {
            Some(sender) => sender.send(task).map_err(|returned| returned.into_inner()),
            None => Err(task),
        }
    }

    pub(crate) fn start(&self, core: &Arc<SchedulerCore>) -> Result<(), WiringError> {
        let Some(task_rx) = self.task_rx.lock().take() else {
            return Ok(());
        };
        let weak = Arc::downgrade(core);
        thread::Builder::new()
            .name(format!("{}-thread", core.name))
            .spawn(move || run(&weak, &task_rx))
            .map_err(|err| {
                WiringError::Pool(PoolError::Internal(format!(
                    "failed to spawn thread for scheduler `{}`: {err}",
                    core.name
                )))
            })?;
        debug!(scheduler = %core.name, "dedicated thread started");
        Ok(())
    }

    pub(crate) fn stop(&self) {
        self.task_tx.lock().take();
    }
}

fn run(core: &Weak<SchedulerCore>, task_rx: &Receiver<Task>) {
    while let Ok(task) = task_rx.recv() {
        let Some(core) = core.upgrade() else {
            break;
        };
        core.execute(task);
    }
}
