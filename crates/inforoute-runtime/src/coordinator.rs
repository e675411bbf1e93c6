//! [`Coordinator`] – the shared refresh cycle.
//!
//! One coordinator owns one [`RoadFeed`] and the last snapshot it produced.
//! Every consumer reads that snapshot; nobody else fetches.
//!
//! # Refresh cycle
//!
//! A cycle is started either by the interval timer (see
//! [`Coordinator::start`]) or by [`Coordinator::request_refresh`].  Both go
//! through the same gate, so at most one fetch is ever in flight.  A request
//! that arrives while a cycle is running waits for that cycle and returns
//! [`RefreshOutcome::Coalesced`] without fetching again.
//!
//! | Outcome | `last_result` | `last_error` | listeners |
//! |---|---|---|---|
//! | success | replaced | cleared | notified |
//! | failure, earlier snapshot | kept (stale) | set | notified |
//! | failure, no snapshot yet | empty | set | not notified |
//!
//! # Timer
//!
//! The wait is measured from the end of the previous cycle, manual ones
//! included, and restarts when the interval is changed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use inforoute_middleware::{EventBus, HttpFeed, DEFAULT_API_URL};
//! use inforoute_runtime::Coordinator;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let feed = Arc::new(HttpFeed::new(DEFAULT_API_URL)?);
//! let coordinator = Arc::new(Coordinator::new(
//!     "Inforoute 65",
//!     feed,
//!     Duration::from_secs(600),
//!     EventBus::default(),
//! ));
//! coordinator.first_refresh().await?;
//! let schedule = coordinator.start();
//! // ...
//! coordinator.shutdown();
//! schedule.await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use inforoute_middleware::{EventBus, RoadFeed, Topic};
use inforoute_types::{Event, EventPayload, FetchError, InforouteError, RoadItem, SetupError};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const EVENT_SOURCE: &str = "inforoute-runtime::coordinator";

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Observer capability: told that a new snapshot (or a new error) is
/// available.  Implementors re-read [`Coordinator::snapshot`]; nothing is
/// pushed into them.
///
/// Called synchronously from the refresh cycle; keep it short and never
/// block on the coordinator's refresh from inside it.
pub trait DataListener: Send + Sync {
    fn on_data_updated(&self);
}

/// Handle returned by [`Coordinator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Copy of the coordinator's mutable state.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    /// Last successful fetch result, empty until the first success.
    pub last_result: Arc<Vec<RoadItem>>,
    /// Error of the most recent cycle, cleared by the next success.
    pub last_error: Option<FetchError>,
    /// Time of the last successful cycle.
    pub last_update: Option<DateTime<Utc>>,
    pub refresh_in_flight: bool,
}

/// What a call to [`Coordinator::request_refresh`] ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// This call ran a cycle and the snapshot was replaced.
    Refreshed { items: usize },
    /// This call ran a cycle and the fetch failed.
    Failed(FetchError),
    /// Another cycle was already running; this call waited for it.
    Coalesced,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the refresh cycle and the last-known snapshot.
pub struct Coordinator {
    name: String,
    feed: Arc<dyn RoadFeed>,
    bus: EventBus,
    state: RwLock<CoordinatorState>,
    /// Held for the whole duration of a cycle.
    gate: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    coalesced: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Weak<dyn DataListener>)>>,
    next_listener: AtomicU64,
    interval: watch::Sender<Duration>,
    cycle_done: Notify,
    stopped: watch::Sender<bool>,
}

impl Coordinator {
    /// Create an idle coordinator.  Nothing is fetched until
    /// [`first_refresh`](Self::first_refresh), [`request_refresh`](Self::request_refresh)
    /// or the timer started by [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        feed: Arc<dyn RoadFeed>,
        update_interval: Duration,
        bus: EventBus,
    ) -> Self {
        Self {
            name: name.into(),
            feed,
            bus,
            state: RwLock::new(CoordinatorState::default()),
            gate: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            coalesced: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            interval: watch::Sender::new(update_interval),
            cycle_done: Notify::new(),
            stopped: watch::Sender::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Snapshot access ──────────────────────────────────────────────────────

    /// The last successful result.  Cheap: clones an [`Arc`].
    pub fn snapshot(&self) -> Arc<Vec<RoadItem>> {
        Arc::clone(&self.read_state().last_result)
    }

    pub fn state(&self) -> CoordinatorState {
        self.read_state().clone()
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.read_state().last_error.clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_update
    }

    /// `true` while a cycle is running.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // ── Refresh ──────────────────────────────────────────────────────────────

    /// Run the initial cycle of a config entry.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::FirstRefresh`] when the fetch fails.  There is no
    /// snapshot to fall back on in that case, so the caller must abort setup.
    pub async fn first_refresh(&self) -> Result<usize, SetupError> {
        let _cycle = self.gate.lock().await;
        self.run_cycle().await.map_err(|e| match e {
            InforouteError::RefreshFailed { cause } => SetupError::FirstRefresh(cause),
            other => SetupError::FirstRefresh(FetchError::Transport(other.to_string())),
        })
    }

    /// Refresh now unless a cycle is already running.
    ///
    /// Safe to call concurrently from any number of triggers: while a cycle
    /// is in flight every extra call waits for it and returns
    /// [`RefreshOutcome::Coalesced`].
    #[instrument(name = "coordinator.request_refresh", skip(self), fields(coordinator = %self.name))]
    pub async fn request_refresh(&self) -> RefreshOutcome {
        let _cycle = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("refresh already in flight; coalescing request");
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                let _finished = self.gate.lock().await;
                return RefreshOutcome::Coalesced;
            }
        };

        match self.run_cycle().await {
            Ok(items) => RefreshOutcome::Refreshed { items },
            Err(InforouteError::RefreshFailed { cause }) => RefreshOutcome::Failed(cause),
            Err(other) => RefreshOutcome::Failed(FetchError::Transport(other.to_string())),
        }
    }

    /// One fetch plus state update.  Callers must hold `gate`.
    async fn run_cycle(&self) -> Result<usize, InforouteError> {
        // Clears the flag even when the caller drops this future mid-fetch.
        let _in_flight = InFlight::begin(self);
        let fetched = self.feed.fetch().await;

        let outcome = match fetched {
            Ok(mut items) => {
                // `last_result` never holds point geometries, whatever the feed does.
                items.retain(|item| !item.is_point());
                let count = items.len();
                {
                    let mut state = self.write_state();
                    state.last_result = Arc::new(items);
                    state.last_error = None;
                    state.last_update = Some(Utc::now());
                    state.refresh_in_flight = false;
                }
                self.in_flight.store(false, Ordering::Release);

                info!(coordinator = %self.name, items = count, "road feed refreshed");
                self.notify_listeners();
                self.publish(EventPayload::RefreshSucceeded { items: count });
                Ok(count)
            }
            Err(cause) => {
                let stale = {
                    let mut state = self.write_state();
                    state.last_error = Some(cause.clone());
                    state.refresh_in_flight = false;
                    state.last_update.is_some()
                };
                self.in_flight.store(false, Ordering::Release);

                warn!(coordinator = %self.name, error = %cause, stale, "road feed refresh failed");
                if stale {
                    self.notify_listeners();
                }
                self.publish(EventPayload::RefreshFailed {
                    cause: cause.clone(),
                    stale,
                });
                Err(InforouteError::RefreshFailed { cause })
            }
        };

        self.cycle_done.notify_waiters();
        outcome
    }

    fn set_in_flight(&self, value: bool) {
        self.in_flight.store(value, Ordering::Release);
        self.write_state().refresh_in_flight = value;
    }

    /// Number of refresh requests that joined a cycle already in flight.
    pub fn coalesced_requests(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    fn publish(&self, payload: EventPayload) {
        if let Err(e) = self
            .bus
            .publish_to(Topic::Refresh, Event::new(EVENT_SOURCE, payload))
        {
            debug!(error = %e, "refresh event not delivered");
        }
    }

    // ── Listeners ────────────────────────────────────────────────────────────

    /// Register `listener` for data-changed signals.
    ///
    /// Only a weak reference is kept: dropping the listener unsubscribes it.
    pub fn subscribe(&self, listener: Weak<dyn DataListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, listener));
        id
    }

    /// Remove a listener.  Returns `false` if it was not registered.
    ///
    /// Safe to call from inside [`DataListener::on_data_updated`].
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Drop every listener.  Used at teardown.
    pub fn clear_listeners(&self) {
        self.lock_listeners().clear();
    }

    /// Number of registered listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        self.lock_listeners()
            .iter()
            .filter(|(_, listener)| listener.strong_count() > 0)
            .count()
    }

    fn notify_listeners(&self) {
        // Snapshot the list so listeners may (un)subscribe while being notified.
        let live: Vec<Arc<dyn DataListener>> = {
            let mut listeners = self.lock_listeners();
            listeners.retain(|(_, listener)| listener.strong_count() > 0);
            listeners
                .iter()
                .filter_map(|(_, listener)| listener.upgrade())
                .collect()
        };
        debug!(listeners = live.len(), "notifying listeners");
        for listener in live {
            listener.on_data_updated();
        }
    }

    // ── Timer ────────────────────────────────────────────────────────────────

    pub fn update_interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Change the refresh interval.  A running timer restarts its wait with
    /// the new value immediately.
    pub fn set_update_interval(&self, interval: Duration) {
        info!(coordinator = %self.name, interval_secs = interval.as_secs(), "update interval changed");
        self.interval.send_replace(interval);
    }

    /// Spawn the interval timer on the current Tokio runtime.
    ///
    /// The task runs until [`shutdown`](Self::shutdown) is called.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_schedule().await })
    }

    /// Stop scheduling further cycles.  A cycle already in flight is left to
    /// finish or time out.
    pub fn shutdown(&self) {
        self.stopped.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.stopped.borrow()
    }

    async fn run_schedule(&self) {
        let mut interval_rx = self.interval.subscribe();
        let mut stopped_rx = self.stopped.subscribe();
        debug!(coordinator = %self.name, "refresh schedule started");

        loop {
            if *stopped_rx.borrow_and_update() {
                break;
            }
            let wait = *interval_rx.borrow_and_update();

            tokio::select! {
                biased;
                _ = stopped_rx.changed() => {}
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.cycle_done.notified() => {
                    debug!("cycle finished outside the schedule; restarting wait");
                }
                _ = tokio::time::sleep(wait) => {
                    let outcome = self.request_refresh().await;
                    debug!(?outcome, "scheduled refresh finished");
                }
            }
        }

        debug!(coordinator = %self.name, "refresh schedule stopped");
    }

    // ── Lock helpers ─────────────────────────────────────────────────────────

    fn read_state(&self) -> RwLockReadGuard<'_, CoordinatorState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CoordinatorState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Weak<dyn DataListener>)>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks a cycle as in flight for as long as it lives.
struct InFlight<'a>(&'a Coordinator);

impl<'a> InFlight<'a> {
    fn begin(coordinator: &'a Coordinator) -> Self {
        coordinator.set_in_flight(true);
        Self(coordinator)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set_in_flight(false);
    }
}
