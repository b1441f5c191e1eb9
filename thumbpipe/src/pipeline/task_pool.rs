//! Task pool: at most one in-flight pipeline run per cache key.
//!
//! ```text
//! request A ─┐
//!            │                         ┌──────────────┐
//! request B ─┼──► TaskPool::task(k) ──►│ Task k       │──► one pipeline run
//!            │                         │ subscribers: │
//! request C ─┘                         │  [A, B, C]   │
//!                                      └──────┬───────┘
//!                          complete(k, outcome)│ fan-out
//!                                              ▼
//!                                    A, B, C get the same result
//! ```
//!
//! All bookkeeping sits behind one lock. Completions are always invoked
//! after the lock is released so a completion may safely call back into
//! the pool.
//!
//! Cancelling a [`Subscription`] delivers [`ThumbnailError::Cancelled`] to
//! that subscriber only. When the last subscriber leaves, the task's
//! cancellation token fires and the task is removed; the run stops at its
//! next stage boundary.

use crate::cache::CacheKey;
use crate::pipeline::error::{ThumbnailError, ThumbnailResult};
use crate::pipeline::stage::Stage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Callback receiving a task's terminal outcome.
pub type Completion = Box<dyn FnOnce(ThumbnailResult) + Send + 'static>;

/// Identity of one run for a key. A key that is retired and requested
/// again gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubscriberId(u64);

struct TaskSlot {
    id: TaskId,
    stage: Option<Stage>,
    token: CancellationToken,
    subscribers: Vec<(SubscriberId, Completion)>,
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Total subscriptions accepted
    pub total_requests: u64,
    /// Subscriptions that joined an existing task
    pub coalesced_requests: u64,
    /// Subscriptions that started a new task
    pub new_requests: u64,
}

impl CoalescerStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

#[derive(Default)]
struct PoolState {
    tasks: HashMap<CacheKey, TaskSlot>,
    next_id: u64,
    stats: CoalescerStats,
}

impl PoolState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Handle to a registered task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    key: CacheKey,
    id: TaskId,
    token: CancellationToken,
    is_new: bool,
}

impl TaskHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// True if this call created the task; the caller must drive it.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Fires once the last subscriber has cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry of in-flight tasks keyed by cache key.
#[derive(Default)]
pub struct TaskPool {
    state: Mutex<PoolState>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the running task for `key`, or registers a new one.
    pub fn task(&self, key: &CacheKey) -> TaskHandle {
        let mut state = self.state.lock();
        if let Some(slot) = state.tasks.get(key) {
            return TaskHandle {
                key: key.clone(),
                id: slot.id,
                token: slot.token.clone(),
                is_new: false,
            };
        }

        let id = TaskId(state.next_id());
        let token = CancellationToken::new();
        state.tasks.insert(
            key.clone(),
            TaskSlot {
                id,
                stage: None,
                token: token.clone(),
                subscribers: Vec::new(),
            },
        );
        trace!(key = %key, in_flight = state.tasks.len(), "Registered new task");

        TaskHandle {
            key: key.clone(),
            id,
            token,
            is_new: true,
        }
    }

    /// Adds a subscriber to a task.
    ///
    /// Returns `None` if the task already retired; the caller should ask
    /// for the task again.
    pub fn subscribe(
        self: &Arc<Self>,
        task: &TaskHandle,
        completion: Completion,
    ) -> Option<Subscription> {
        let mut state = self.state.lock();
        let subscriber = SubscriberId(state.next_id());

        let slot = state.tasks.get_mut(&task.key).filter(|s| s.id == task.id)?;
        slot.subscribers.push((subscriber, completion));
        let subscribers = slot.subscribers.len();

        state.stats.total_requests += 1;
        if task.is_new {
            state.stats.new_requests += 1;
        } else {
            state.stats.coalesced_requests += 1;
            debug!(key = %task.key, subscribers, "Coalesced request onto in-flight task");
        }

        Some(Subscription {
            pool: Arc::downgrade(self),
            key: task.key.clone(),
            task: task.id,
            subscriber,
        })
    }

    /// Looks up or registers the task for `key` and subscribes to it under
    /// a single lock acquisition, so the subscription cannot miss the task.
    pub fn join(
        self: &Arc<Self>,
        key: &CacheKey,
        completion: Completion,
    ) -> (TaskHandle, Subscription) {
        let mut guard = self.state.lock();
        let subscriber = SubscriberId(guard.next_id());
        let candidate = TaskId(guard.next_id());
        let state = &mut *guard;

        let is_new = !state.tasks.contains_key(key);
        let slot = state.tasks.entry(key.clone()).or_insert_with(|| TaskSlot {
            id: candidate,
            stage: None,
            token: CancellationToken::new(),
            subscribers: Vec::new(),
        });
        slot.subscribers.push((subscriber, completion));
        let (id, token, subscribers) = (slot.id, slot.token.clone(), slot.subscribers.len());

        state.stats.total_requests += 1;
        if is_new {
            state.stats.new_requests += 1;
            trace!(key = %key, in_flight = state.tasks.len(), "Registered new task");
        } else {
            state.stats.coalesced_requests += 1;
            debug!(key = %key, subscribers, "Coalesced request onto in-flight task");
        }

        let handle = TaskHandle {
            key: key.clone(),
            id,
            token,
            is_new,
        };
        let subscription = Subscription {
            pool: Arc::downgrade(self),
            key: key.clone(),
            task: id,
            subscriber,
        };
        (handle, subscription)
    }

    /// Records the stage a task is entering.
    ///
    /// Returns false if the task retired or was cancelled, in which case the
    /// caller must not proceed.
    pub fn set_stage(&self, task: &TaskHandle, stage: Stage) -> bool {
        let mut state = self.state.lock();
        match state.tasks.get_mut(&task.key) {
            Some(slot) if slot.id == task.id && !slot.token.is_cancelled() => {
                slot.stage = Some(stage);
                true
            }
            _ => false,
        }
    }

    /// Retires a task and delivers its outcome to every current subscriber.
    ///
    /// Returns the number of subscribers that received the outcome. A stale
    /// handle (task already retired) delivers nothing.
    pub fn complete(&self, task: &TaskHandle, outcome: ThumbnailResult) -> usize {
        let subscribers = {
            let mut state = self.state.lock();
            match state.tasks.get(&task.key) {
                Some(slot) if slot.id == task.id => {}
                _ => return 0,
            }
            match state.tasks.remove(&task.key) {
                Some(slot) => slot.subscribers,
                None => return 0,
            }
        };

        let delivered = subscribers.len();
        debug!(
            key = %task.key,
            subscribers = delivered,
            success = outcome.is_ok(),
            "Task complete"
        );
        for (_, completion) in subscribers {
            completion(outcome.clone());
        }
        delivered
    }

    fn unsubscribe(&self, key: &CacheKey, task: TaskId, subscriber: SubscriberId) -> bool {
        let completion = {
            let mut state = self.state.lock();
            let Some(slot) = state.tasks.get_mut(key).filter(|s| s.id == task) else {
                return false;
            };
            let Some(index) = slot.subscribers.iter().position(|(id, _)| *id == subscriber)
            else {
                return false;
            };
            let (_, completion) = slot.subscribers.remove(index);

            if slot.subscribers.is_empty() {
                slot.token.cancel();
                let stage = slot.stage;
                state.tasks.remove(key);
                debug!(key = %key, stage = ?stage, "Last subscriber cancelled, task removed");
            }
            completion
        };

        completion(Err(ThumbnailError::Cancelled));
        true
    }

    /// Number of tasks currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Number of subscribers waiting on `key`.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.state
            .lock()
            .tasks
            .get(key)
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Stage the task for `key` last entered.
    pub fn stage_of(&self, key: &CacheKey) -> Option<Stage> {
        self.state.lock().tasks.get(key).and_then(|slot| slot.stage)
    }

    /// Snapshot of the coalescing counters.
    pub fn stats(&self) -> CoalescerStats {
        self.state.lock().stats.clone()
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

/// A caller's interest in a task's outcome.
///
/// Dropping the subscription leaves it attached; call
/// [`Subscription::cancel`] to withdraw.
#[derive(Debug)]
pub struct Subscription {
    pool: Weak<TaskPool>,
    key: CacheKey,
    task: TaskId,
    subscriber: SubscriberId,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Withdraws this subscriber. Its completion receives
    /// [`ThumbnailError::Cancelled`]; other subscribers are unaffected.
    ///
    /// Returns false if the outcome was already delivered.
    pub fn cancel(&self) -> bool {
        match self.pool.upgrade() {
            Some(pool) => pool.unsubscribe(&self.key, self.task, self.subscriber),
            None => false,
        }
    }
}
