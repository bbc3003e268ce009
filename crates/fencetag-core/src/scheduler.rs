//! Deferred tag removal.
//!
//! [`ExpiryScheduler`] is a cheap handle onto a single dispatcher task. All
//! removals fire on that task, in deadline order, so the tag store sees
//! deferred mutations from one place only. A removal never fires before its
//! delay has elapsed and fires at most once. Store applies run inline on the
//! dispatcher, so a slow store delays later removals. Senders never block.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::{FencetagError, Result};
use crate::store::TagStore;
use crate::tags::{DeferredRemoval, ExpiryKey, TagMutation};

/// What happens to a pending removal when its zone/target sees another event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Every scheduled removal fires, even if the pair was re-entered or
    /// checked out in the meantime.
    FireAlways,
    /// A later event for the same pair drops the pending removal; a
    /// qualifying re-entry schedules a fresh one.
    #[default]
    CancelOnReentry,
}

/// Counters exposed by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExpiryStats {
    /// Removals accepted by [`ExpiryScheduler::schedule`].
    pub scheduled: u64,
    /// Removals applied to the tag store.
    pub fired: u64,
    /// Removals dropped because a later event superseded them.
    pub superseded: u64,
    /// Removals whose tag store apply failed.
    pub failed: u64,
}

/// A removal waiting for its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingRemoval {
    /// Zone/target pair.
    pub key: ExpiryKey,
    /// Tags that will be removed.
    pub tags: BTreeSet<String>,
    /// Milliseconds until the removal fires.
    pub remaining_ms: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    fired: AtomicU64,
    superseded: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ExpiryStats {
        ExpiryStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

enum Command {
    Schedule {
        id: u64,
        deadline: Instant,
        removal: DeferredRemoval,
    },
    Supersede(ExpiryKey),
    Pending(oneshot::Sender<Vec<PendingRemoval>>),
}

/// Handle to the expiry dispatcher.
///
/// Dropping every handle stops the dispatcher; removals still pending at
/// that point never fire.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    commands: mpsc::UnboundedSender<Command>,
    policy: ExpiryPolicy,
    next_id: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule { id, removal, .. } => f
                .debug_struct("Schedule")
                .field("id", id)
                .field("key", &removal.key)
                .finish(),
            Self::Supersede(key) => f.debug_tuple("Supersede").field(key).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl ExpiryScheduler {
    /// Spawns the dispatcher task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(store: Arc<dyn TagStore>, policy: ExpiryPolicy) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let dispatcher = Dispatcher {
            store,
            policy,
            queue: BTreeMap::new(),
            by_key: HashMap::new(),
            counters: Arc::clone(&counters),
        };
        tokio::spawn(dispatcher.run(receiver));

        info!(?policy, "Expiry dispatcher started");

        Self {
            commands,
            policy,
            next_id: Arc::new(AtomicU64::new(0)),
            counters,
        }
    }

    /// Policy this scheduler was started with.
    #[must_use]
    pub const fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Registers a removal to fire after `removal.delay`.
    ///
    /// The delay is measured from this call. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FencetagError::SchedulerUnavailable`] if the dispatcher has stopped.
    pub fn schedule(&self, removal: DeferredRemoval) -> Result<()> {
        let deadline = Instant::now() + removal.delay;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.commands
            .send(Command::Schedule {
                id,
                deadline,
                removal,
            })
            .map_err(|_| FencetagError::SchedulerUnavailable)?;
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Drops the pending removal for `key`, if any.
    ///
    /// Does nothing under [`ExpiryPolicy::FireAlways`].
    ///
    /// # Errors
    ///
    /// Returns [`FencetagError::SchedulerUnavailable`] if the dispatcher has stopped.
    pub fn supersede(&self, key: &ExpiryKey) -> Result<()> {
        if self.policy == ExpiryPolicy::FireAlways {
            return Ok(());
        }
        self.commands
            .send(Command::Supersede(key.clone()))
            .map_err(|_| FencetagError::SchedulerUnavailable)
    }

    /// Removals that have not fired yet, soonest first.
    ///
    /// # Errors
    ///
    /// Returns [`FencetagError::SchedulerUnavailable`] if the dispatcher has stopped.
    pub async fn pending(&self) -> Result<Vec<PendingRemoval>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Pending(reply))
            .map_err(|_| FencetagError::SchedulerUnavailable)?;
        response.await.map_err(|_| FencetagError::SchedulerUnavailable)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ExpiryStats {
        self.counters.snapshot()
    }
}

struct Dispatcher {
    store: Arc<dyn TagStore>,
    policy: ExpiryPolicy,
    queue: BTreeMap<(Instant, u64), DeferredRemoval>,
    // Only populated under `CancelOnReentry`.
    by_key: HashMap<ExpiryKey, (Instant, u64)>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let next_deadline = self.queue.keys().next().map(|(deadline, _)| *deadline);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                () = sleep_until(next_deadline.unwrap_or_else(far_future)), if next_deadline.is_some() => {
                    self.fire_due(Instant::now());
                }
            }
        }

        if !self.queue.is_empty() {
            debug!(dropped = self.queue.len(), "Expiry dispatcher stopped with pending removals");
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Schedule {
                id,
                deadline,
                removal,
            } => {
                if self.policy == ExpiryPolicy::CancelOnReentry {
                    self.drop_pending(&removal.key);
                    self.by_key.insert(removal.key.clone(), (deadline, id));
                }
                debug!(
                    zone = %removal.key.zone,
                    target = %removal.key.target,
                    delay_ms = u64::try_from(removal.delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduled tag expiry"
                );
                self.queue.insert((deadline, id), removal);
            }
            Command::Supersede(key) => self.drop_pending(&key),
            Command::Pending(reply) => {
                let now = Instant::now();
                let pending = self
                    .queue
                    .iter()
                    .map(|((deadline, _), removal)| PendingRemoval {
                        key: removal.key.clone(),
                        tags: removal.remove.clone(),
                        remaining_ms: u64::try_from(
                            deadline.saturating_duration_since(now).as_millis(),
                        )
                        .unwrap_or(u64::MAX),
                    })
                    .collect();
                let _ = reply.send(pending);
            }
        }
    }

    fn drop_pending(&mut self, key: &ExpiryKey) {
        if let Some(slot) = self.by_key.remove(key) {
            if self.queue.remove(&slot).is_some() {
                self.counters.superseded.fetch_add(1, Ordering::Relaxed);
                debug!(zone = %key.zone, target = %key.target, "Superseded pending tag expiry");
            }
        }
    }

    fn fire_due(&mut self, now: Instant) {
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let slot = *entry.key();
            let removal = entry.remove();
            if self.by_key.get(&removal.key) == Some(&slot) {
                self.by_key.remove(&removal.key);
            }

            match self.store.apply(&TagMutation::removing(removal.remove)) {
                Ok(()) => {
                    self.counters.fired.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        zone = %removal.key.zone,
                        target = %removal.key.target,
                        "Expired tags removed"
                    );
                }
                Err(error) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        zone = %removal.key.zone,
                        target = %removal.key.target,
                        %error,
                        "Failed to remove expired tags"
                    );
                }
            }
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}
