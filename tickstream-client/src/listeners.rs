//! Local listener bookkeeping
//!
//! Tracks which local callbacks are interested in which symbols and tells
//! the transport layer when the first listener for a symbol appears (send a
//! subscribe) or the last one goes away (send an unsubscribe). The transport
//! subscription for a symbol exists if and only if at least one listener is
//! registered for it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tickstream_core::{PriceSample, Symbol};

/// Callback invoked with each incoming sample
pub type PriceCallback = Arc<dyn Fn(&PriceSample) + Send + Sync>;

/// Handle identifying one registered listener.
///
/// Removal goes by handle identity, so registering the same callback twice
/// yields two independently removable registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    symbol: Symbol,
    id: u64,
}

impl ListenerHandle {
    /// Symbol this listener is registered for
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

/// Control message the transport must emit after a bookkeeping change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookAction {
    /// First listener for the symbol: issue a transport-level subscribe
    SendSubscribe(Symbol),
    /// Last listener removed: issue a transport-level unsubscribe
    SendUnsubscribe(Symbol),
    /// Subscription state unchanged
    None,
}

struct Listener {
    id: u64,
    callback: PriceCallback,
}

/// Ordered per-symbol listener registry with refcounted transport interest
pub struct ListenerBook {
    inner: Mutex<HashMap<Symbol, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl ListenerBook {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for a symbol.
    ///
    /// Returns the removal handle and the transport action: `SendSubscribe`
    /// when this is the symbol's first listener, `None` otherwise.
    pub fn register(
        &self,
        symbol: Symbol,
        callback: impl Fn(&PriceSample) + Send + Sync + 'static,
    ) -> (ListenerHandle, BookAction) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();

        let listeners = inner.entry(symbol.clone()).or_default();
        let first = listeners.is_empty();
        listeners.push(Listener {
            id,
            callback: Arc::new(callback),
        });

        let action = if first {
            BookAction::SendSubscribe(symbol.clone())
        } else {
            BookAction::None
        };
        (ListenerHandle { symbol, id }, action)
    }

    /// Remove a listener by handle.
    ///
    /// Returns `SendUnsubscribe` when the symbol's last listener was just
    /// removed. Removing an already-removed handle is a no-op.
    pub fn remove(&self, handle: &ListenerHandle) -> BookAction {
        let mut inner = self.inner.lock();

        let Some(listeners) = inner.get_mut(&handle.symbol) else {
            return BookAction::None;
        };
        let Some(position) = listeners.iter().position(|l| l.id == handle.id) else {
            return BookAction::None;
        };
        listeners.remove(position);

        if listeners.is_empty() {
            inner.remove(&handle.symbol);
            BookAction::SendUnsubscribe(handle.symbol.clone())
        } else {
            BookAction::None
        }
    }

    /// Symbols that still have at least one listener; these are replayed
    /// with fresh subscribes after a reconnect
    pub fn replay_symbols(&self) -> Vec<Symbol> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Number of listeners registered for a symbol
    pub fn listener_count(&self, symbol: &Symbol) -> usize {
        self.inner
            .lock()
            .get(symbol)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Fan a sample out to every listener for its symbol, in registration
    /// order, at most once each. Returns the number of callbacks invoked.
    pub fn dispatch(&self, sample: &PriceSample) -> usize {
        // Snapshot the callbacks so a listener can re-enter the book
        // (subscribe/unsubscribe) from inside its callback
        let callbacks: Vec<PriceCallback> = {
            let inner = self.inner.lock();
            match inner.get(&sample.symbol) {
                Some(listeners) => listeners.iter().map(|l| Arc::clone(&l.callback)).collect(),
                None => return 0,
            }
        };

        for callback in &callbacks {
            callback(sample);
        }
        callbacks.len()
    }
}

impl Default for ListenerBook {
    fn default() -> Self {
        Self::new()
    }
}
