use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot of outstanding work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressInfo {
    pub number_of_tasks: usize,
    pub number_completed: usize,
    pub number_remaining: usize,
}

impl ProgressInfo {
    pub fn is_complete(&self) -> bool {
        self.number_remaining == 0
    }
}

/// Shared outstanding-task counter.
///
/// Each operation that carries a `Progress` adds one task when the queue
/// accepts it and completes one when it reaches any terminal outcome. The
/// counters clear once nothing is outstanding, so a new batch of work starts
/// from zero.
#[derive(Clone)]
pub struct Progress {
    sender: Arc<watch::Sender<ProgressInfo>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ProgressInfo::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressInfo> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> ProgressInfo {
        *self.sender.borrow()
    }

    pub fn add_task(&self) {
        self.add_tasks(1);
    }

    pub fn add_tasks(&self, count: usize) {
        self.sender.send_modify(|info| {
            info.number_of_tasks += count;
            info.number_remaining += count;
        });
    }

    pub fn complete_task(&self) {
        self.sender.send_modify(|info| {
            if info.number_remaining == 0 {
                tracing::warn!("Progress completed more tasks than were added");
                return;
            }
            info.number_remaining -= 1;
            info.number_completed += 1;
            if info.number_remaining == 0 {
                *info = ProgressInfo::default();
            }
        });
    }
}
