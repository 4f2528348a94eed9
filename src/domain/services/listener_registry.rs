//! Per-symbol listener lists for streamed price ticks

use crate::domain::entities::quote::PriceTick;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub const DEFAULT_LISTENER_CAPACITY: usize = 64;

type ListenerMap = HashMap<String, Vec<mpsc::Sender<PriceTick>>>;

/// Drop closed senders and empty symbols. Returns the number removed.
fn prune_closed(listeners: &mut ListenerMap) -> usize {
    let mut pruned = 0;
    listeners.retain(|_, list| {
        let before = list.len();
        list.retain(|tx| !tx.is_closed());
        pruned += before - list.len();
        !list.is_empty()
    });
    pruned
}

/// Outcome of delivering one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Listener was full; the tick was skipped for it
    pub dropped: usize,
    /// Listener was closed and has been removed
    pub pruned: usize,
}

pub struct ListenerRegistry {
    listeners: Mutex<ListenerMap>,
    capacity: usize,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_CAPACITY)
    }
}

impl ListenerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new listener for `symbol`. Dropping the receiver unsubscribes.
    ///
    /// Listeners closed on any symbol are swept here as well, so symbols that
    /// stop ticking do not keep dead senders around.
    pub fn subscribe(&self, symbol: &str) -> mpsc::Receiver<PriceTick> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pruned = prune_closed(&mut listeners);
        if pruned > 0 {
            tracing::debug!("Pruned {} closed listener(s)", pruned);
        }
        listeners.entry(symbol.to_string()).or_default().push(tx);
        tracing::debug!(
            "Listener added for {} ({} total)",
            symbol,
            listeners.get(symbol).map(Vec::len).unwrap_or(0)
        );
        rx
    }

    /// Deliver `tick` to every live listener of its symbol
    pub fn dispatch(&self, tick: &PriceTick) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(list) = listeners.get_mut(&tick.symbol) else {
            return report;
        };

        list.retain(|tx| match tx.try_send(tick.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.pruned += 1;
                false
            }
        });

        if list.is_empty() {
            listeners.remove(&tick.symbol);
        }
        report
    }

    /// Remove every closed listener
    pub fn prune(&self) -> usize {
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prune_closed(&mut listeners)
    }

    /// Number of live listeners for `symbol`
    pub fn listener_count(&self, symbol: &str) -> usize {
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prune_closed(&mut listeners);
        listeners.get(symbol).map(Vec::len).unwrap_or(0)
    }

    /// Symbols with at least one live listener
    pub fn symbols(&self) -> Vec<String> {
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prune_closed(&mut listeners);
        let mut symbols: Vec<String> = listeners.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
