//! Connectivity state tracking and transfer suitability.
//!
//! A single [`NetworkMonitor`] runs per process: one writer (the feed task
//! started with [`NetworkMonitor::start`]) and any number of readers. State
//! transitions are pushed over an explicit broadcast channel rather than a
//! singleton global, so tests inject synthetic transitions through a
//! [`ChannelSource`].

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Broadcast buffer for connectivity transitions. Slow subscribers that
/// fall further behind observe a lag error and resubscribe.
const TRANSITION_BUFFER: usize = 32;

/// Transport carrying the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Wi-Fi or ethernet-class link.
    Wifi,
    /// Cellular data.
    Cellular,
    /// No link at all.
    None,
    /// Anything else (VPN over unknown link, bluetooth tether, ...).
    Other,
}

/// Coarse verdict on whether a transfer should start now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suitability {
    /// No connectivity; a transfer cannot start.
    NotAvailable,
    /// Metered connectivity; transfer is permitted but callers are warned.
    Limited,
    /// Unmetered connectivity.
    Suitable,
}

/// Snapshot of connectivity. Value type with no persistent identity:
/// recomputed wholesale on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    /// Whether any usable link is up.
    pub available: bool,
    /// Transport of the active link.
    pub transport: Transport,
    /// Whether the active link is metered.
    pub metered: bool,
}

impl NetworkState {
    /// No connectivity at all.
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            available: false,
            transport: Transport::None,
            metered: false,
        }
    }

    /// Unmetered Wi-Fi.
    #[must_use]
    pub const fn wifi() -> Self {
        Self {
            available: true,
            transport: Transport::Wifi,
            metered: false,
        }
    }

    /// Metered cellular data.
    #[must_use]
    pub const fn cellular() -> Self {
        Self {
            available: true,
            transport: Transport::Cellular,
            metered: true,
        }
    }

    /// Suitability verdict for this state.
    ///
    /// `NotAvailable` iff the link is down, regardless of transport.
    /// `Limited` iff the link is up but metered (cellular or metered
    /// Wi-Fi). `Suitable` otherwise.
    #[must_use]
    pub fn suitability(self) -> Suitability {
        if !self.available {
            Suitability::NotAvailable
        } else if self.metered {
            Suitability::Limited
        } else {
            Suitability::Suitable
        }
    }
}

/// Feed of connectivity transitions from the platform (or a test).
#[async_trait]
pub trait ConnectivitySource: Send + 'static {
    /// The next transition, or `None` when the source is exhausted.
    async fn next_change(&mut self) -> Option<NetworkState>;
}

/// Channel-backed source for wiring and tests: transitions sent on the
/// returned sender are forwarded to the monitor.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<NetworkState>,
}

impl ChannelSource {
    /// Creates a source plus the sender feeding it.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<NetworkState>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl ConnectivitySource for ChannelSource {
    async fn next_change(&mut self) -> Option<NetworkState> {
        self.rx.recv().await
    }
}

struct MonitorInner {
    current: RwLock<NetworkState>,
    sender: broadcast::Sender<NetworkState>,
}

impl MonitorInner {
    /// Records a transition, coalescing consecutive identical states into
    /// a single emission. Returns whether the state actually changed.
    fn update(&self, state: NetworkState) -> bool {
        {
            let Ok(mut current) = self.current.write() else {
                return false;
            };
            if *current == state {
                return false;
            }
            *current = state;
        }
        debug!(?state, "connectivity transition");
        // Send fails only with zero subscribers, which is fine.
        let _ = self.sender.send(state);
        true
    }
}

/// Process-wide connectivity monitor.
///
/// Single-writer, multi-reader: exactly one background task (started via
/// [`start`](Self::start)) feeds transitions in, and every interested
/// orchestrator subscribes for the live stream. `start` and
/// [`stop`](Self::stop) are idempotent; a second `start` never duplicates
/// the underlying subscription.
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Creates a monitor seeded with `initial`.
    #[must_use]
    pub fn new(initial: NetworkState) -> Self {
        let (sender, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(MonitorInner {
                current: RwLock::new(initial),
                sender,
            }),
            feed: Mutex::new(None),
        }
    }

    /// The most recently observed state.
    #[must_use]
    pub fn current_state(&self) -> NetworkState {
        self.inner
            .current
            .read()
            .map_or(NetworkState::offline(), |guard| *guard)
    }

    /// Suitability verdict for starting a transfer right now.
    #[must_use]
    pub fn suitability_for_transfer(&self) -> Suitability {
        self.current_state().suitability()
    }

    /// Subscribes to the live stream of transitions.
    ///
    /// Consecutive identical states are coalesced at the publishing side,
    /// so subscribers never see redundant emissions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.inner.sender.subscribe()
    }

    /// Starts consuming `source` on a background task.
    ///
    /// Idempotent: if a feed task is already running, the call is a no-op
    /// and `false` is returned (the new source is dropped).
    #[instrument(skip(self, source))]
    pub fn start<S: ConnectivitySource>(&self, mut source: S) -> bool {
        let Ok(mut slot) = self.feed.lock() else {
            return false;
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("monitor already started; ignoring");
            return false;
        }

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            while let Some(state) = source.next_change().await {
                inner.update(state);
            }
            info!("connectivity source exhausted");
        }));
        true
    }

    /// Stops the feed task. Idempotent; subscribers stay connected and
    /// simply see no further transitions until the next [`start`](Self::start).
    pub fn stop(&self) {
        if let Ok(mut slot) = self.feed.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
