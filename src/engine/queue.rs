//! Dependency-aware operation queue.
//!
//! A single actor task owns every queued operation, the dependency graph and
//! the progress bookkeeping. Callers talk to it through [`QueueHandle`],
//! which only sends messages. Running operations are polled by the actor
//! itself, so completion handling is serialized with command handling.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

use super::error::SyncError;
use super::operation::{
    CancelFlag, Operation, OperationContext, OperationDelegate, OperationId, Outcome,
};
use super::progress::Progress;

/// Operations allowed to run at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Canceled ids remembered so that late dependents are canceled too.
const CANCELED_HISTORY: usize = 1024;

pub type CompletionCallback = Box<dyn FnOnce(&Outcome) + Send>;

// ============================================================================
// Enqueue Request
// ============================================================================

/// An operation plus everything the queue needs to schedule it.
pub struct Enqueue {
    operation: Box<dyn Operation>,
    dependencies: Vec<OperationId>,
    delegate: Option<Weak<dyn OperationDelegate>>,
    progress: Option<Progress>,
    on_complete: Option<CompletionCallback>,
}

impl Enqueue {
    pub fn new(operation: impl Operation + 'static) -> Self {
        Self::boxed(Box::new(operation))
    }

    pub fn boxed(operation: Box<dyn Operation>) -> Self {
        Self {
            operation,
            dependencies: Vec::new(),
            delegate: None,
            progress: None,
            on_complete: None,
        }
    }

    /// Do not start until `dependency` has completed.
    pub fn after(mut self, dependency: OperationId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn after_all(mut self, dependencies: impl IntoIterator<Item = OperationId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    /// Failure delegate. Held weakly; a dropped delegate is skipped.
    pub fn delegate(mut self, delegate: Weak<dyn OperationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&Outcome) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    fn name(&self) -> &str {
        self.operation.name()
    }
}

// ============================================================================
// Handle
// ============================================================================

enum Command {
    Add { id: OperationId, request: Enqueue },
    AddDependency { operation: OperationId, dependency: OperationId },
    Cancel(OperationId),
    CancelAll,
    Suspend,
    Resume,
}

/// Cloneable sender side of the queue.
///
/// The actor stops once every handle is dropped and the running operations
/// have finished; operations still waiting at that point complete as canceled.
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl QueueHandle {
    /// Add an operation and return its id.
    pub fn add(&self, request: Enqueue) -> OperationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(mpsc::error::SendError(Command::Add { request, .. })) =
            self.commands.send(Command::Add { id, request })
        {
            tracing::warn!(operation = %request.name(), "Operation queue has shut down, dropping operation");
            if let Some(callback) = request.on_complete {
                callback(&Outcome::Canceled);
            }
        }
        id
    }

    /// Add an operation now and return a future resolving to its outcome.
    pub fn run(&self, mut request: Enqueue) -> impl Future<Output = Outcome> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let previous = request.on_complete.take();
        request = request.on_complete(move |outcome| {
            if let Some(previous) = previous {
                previous(outcome);
            }
            let _ = tx.send(outcome.clone());
        });
        self.add(request);
        async move { rx.await.unwrap_or(Outcome::Canceled) }
    }

    /// Make `operation` wait for `dependency`. Ignored once `operation` has started.
    pub fn add_dependency(&self, operation: OperationId, dependency: OperationId) {
        self.send(Command::AddDependency {
            operation,
            dependency,
        });
    }

    /// Cancel one operation and, transitively, everything that depends on it.
    pub fn cancel(&self, operation: OperationId) {
        self.send(Command::Cancel(operation));
    }

    pub fn cancel_all(&self) {
        self.send(Command::CancelAll);
    }

    /// Stop starting operations. Running operations continue.
    pub fn suspend(&self) {
        self.send(Command::Suspend);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Operation queue has shut down, ignoring command");
        }
    }

    fn downgrade(&self) -> WeakQueueHandle {
        WeakQueueHandle {
            commands: self.commands.downgrade(),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

struct WeakQueueHandle {
    commands: mpsc::WeakUnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl WeakQueueHandle {
    fn upgrade(&self) -> Option<QueueHandle> {
        Some(QueueHandle {
            commands: self.commands.upgrade()?,
            next_id: Arc::clone(&self.next_id),
        })
    }
}

// ============================================================================
// Queue Actor
// ============================================================================

/// Spawns queue actors.
pub struct OperationQueue;

impl OperationQueue {
    /// Spawn a queue on the current tokio runtime.
    pub fn spawn() -> QueueHandle {
        Self::spawn_with_concurrency(DEFAULT_MAX_CONCURRENT)
    }

    pub fn spawn_with_concurrency(max_concurrent: usize) -> QueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = QueueHandle {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let actor = QueueActor::new(handle.downgrade(), max_concurrent);
        tokio::spawn(actor.run(rx));
        handle
    }
}

type RunningOperation = BoxFuture<'static, (OperationId, Box<dyn Operation>, Result<(), SyncError>)>;

enum EntryState {
    Waiting(Box<dyn Operation>),
    Running,
}

struct Entry {
    name: String,
    state: EntryState,
    dependencies: HashSet<OperationId>,
    canceled: CancelFlag,
    delegate: Option<Weak<dyn OperationDelegate>>,
    progress: Option<Progress>,
    on_complete: Option<CompletionCallback>,
}

struct QueueActor {
    handle: WeakQueueHandle,
    /// Ordered by id, so ready operations start in insertion order.
    entries: BTreeMap<OperationId, Entry>,
    dependents: HashMap<OperationId, Vec<OperationId>>,
    /// Recently canceled ids, oldest first in `canceled_order`.
    ///
    /// Ids are allocated before their `Add` is sent, so any id missing from
    /// `entries` has already completed.
    canceled: HashSet<OperationId>,
    canceled_order: VecDeque<OperationId>,
    running: FuturesUnordered<RunningOperation>,
    suspended: bool,
    max_concurrent: usize,
}

impl QueueActor {
    fn new(handle: WeakQueueHandle, max_concurrent: usize) -> Self {
        Self {
            handle,
            entries: BTreeMap::new(),
            dependents: HashMap::new(),
            canceled: HashSet::new(),
            canceled_order: VecDeque::new(),
            running: FuturesUnordered::new(),
            suspended: false,
            max_concurrent: max_concurrent.max(1),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut open = true;
        loop {
            if open {
                open = self.drain(&mut commands);
            }
            self.start_ready();
            if !open && self.running.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                command = commands.recv(), if open => match command {
                    Some(command) => self.handle(command),
                    None => open = false,
                },
                Some((id, operation, result)) = self.running.next(), if !self.running.is_empty() => {
                    // Follow-up work added by the operation must be registered
                    // before its dependents are released.
                    if open {
                        open = self.drain(&mut commands);
                    }
                    drop(operation);
                    self.finish(id, result);
                }
            }
        }

        let leftover: Vec<OperationId> = self.entries.keys().copied().collect();
        for id in leftover {
            self.cancel(id);
        }
        tracing::debug!("Operation queue stopped");
    }

    /// Handle every queued command. Returns `false` once all senders are gone.
    fn drain(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        loop {
            match commands.try_recv() {
                Ok(command) => self.handle(command),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Add { id, request } => self.add(id, request),
            Command::AddDependency {
                operation,
                dependency,
            } => self.add_dependency(operation, dependency),
            Command::Cancel(id) => self.cancel(id),
            Command::CancelAll => {
                let ids: Vec<OperationId> = self.entries.keys().copied().collect();
                tracing::debug!(count = ids.len(), "Canceling all operations");
                for id in ids {
                    self.cancel(id);
                }
            }
            Command::Suspend => self.suspended = true,
            Command::Resume => self.suspended = false,
        }
    }

    fn add(&mut self, id: OperationId, request: Enqueue) {
        let Enqueue {
            operation,
            dependencies,
            delegate,
            progress,
            on_complete,
        } = request;

        if let Some(progress) = &progress {
            progress.add_task();
        }

        let mut waiting_on = HashSet::new();
        let mut dependency_canceled = false;
        for dependency in dependencies {
            if self.entries.contains_key(&dependency) {
                if waiting_on.insert(dependency) {
                    self.dependents.entry(dependency).or_default().push(id);
                }
            } else {
                dependency_canceled |= self.canceled.contains(&dependency);
            }
        }

        self.entries.insert(
            id,
            Entry {
                name: operation.name().to_string(),
                state: EntryState::Waiting(operation),
                dependencies: waiting_on,
                canceled: CancelFlag::new(),
                delegate,
                progress,
                on_complete,
            },
        );

        if dependency_canceled {
            self.cancel(id);
        }
    }

    fn add_dependency(&mut self, operation: OperationId, dependency: OperationId) {
        let dependency_pending = self.entries.contains_key(&dependency);
        let dependency_canceled = self.canceled.contains(&dependency);
        let Some(entry) = self.entries.get_mut(&operation) else {
            tracing::warn!(operation_id = operation, "Dependency added to a finished operation, ignoring");
            return;
        };
        if matches!(entry.state, EntryState::Running) {
            tracing::warn!(operation = %entry.name, "Dependency added to a running operation, ignoring");
            return;
        }

        if dependency_pending {
            if entry.dependencies.insert(dependency) {
                self.dependents.entry(dependency).or_default().push(operation);
            }
        } else if dependency_canceled {
            self.cancel(operation);
        }
    }

    fn cancel(&mut self, id: OperationId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        entry.canceled.cancel();
        if matches!(entry.state, EntryState::Waiting(_)) {
            if let Some(entry) = self.entries.remove(&id) {
                self.complete(id, entry, Outcome::Canceled);
            }
        }
        // Running operations report their outcome when they return.
    }

    fn start_ready(&mut self) {
        if self.suspended {
            return;
        }
        while self.running.len() < self.max_concurrent {
            let next = self
                .entries
                .iter()
                .find(|(_, e)| matches!(e.state, EntryState::Waiting(_)) && e.dependencies.is_empty())
                .map(|(id, _)| *id);
            let Some(id) = next else {
                break;
            };
            self.start(id);
        }
    }

    fn start(&mut self, id: OperationId) {
        let Some(queue) = self.handle.upgrade() else {
            self.cancel(id);
            return;
        };
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let EntryState::Waiting(mut operation) = std::mem::replace(&mut entry.state, EntryState::Running) else {
            return;
        };

        tracing::debug!(operation = %entry.name, operation_id = id, "Starting operation");
        let ctx = OperationContext::new(id, entry.canceled.clone(), queue);
        self.running.push(Box::pin(async move {
            let result = operation.run(&ctx).await;
            (id, operation, result)
        }));
    }

    fn finish(&mut self, id: OperationId, result: Result<(), SyncError>) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };

        let outcome = match result {
            _ if entry.canceled.is_canceled() => Outcome::Canceled,
            Ok(()) => Outcome::Succeeded,
            Err(SyncError::Canceled) => Outcome::Canceled,
            Err(error) => {
                tracing::warn!(operation = %entry.name, error = %error, "Operation failed");
                if let Some(delegate) = entry.delegate.as_ref().and_then(Weak::upgrade) {
                    delegate.operation_did_fail(&entry.name, &error);
                }
                Outcome::Failed(error)
            }
        };
        self.complete(id, entry, outcome);
    }

    fn complete(&mut self, id: OperationId, entry: Entry, outcome: Outcome) {
        tracing::debug!(operation = %entry.name, operation_id = id, outcome = ?outcome, "Operation completed");

        if let Some(callback) = entry.on_complete {
            callback(&outcome);
        }
        if let Some(progress) = &entry.progress {
            progress.complete_task();
        }

        let canceled = outcome.is_canceled();
        if canceled {
            self.remember_canceled(id);
        }

        for dependent in self.dependents.remove(&id).unwrap_or_default() {
            if canceled {
                self.cancel(dependent);
            } else if let Some(waiting) = self.entries.get_mut(&dependent) {
                waiting.dependencies.remove(&id);
            }
        }
    }

    fn remember_canceled(&mut self, id: OperationId) {
        if !self.canceled.insert(id) {
            return;
        }
        self.canceled_order.push_back(id);
        while self.canceled_order.len() > CANCELED_HISTORY {
            if let Some(oldest) = self.canceled_order.pop_front() {
                self.canceled.remove(&oldest);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
