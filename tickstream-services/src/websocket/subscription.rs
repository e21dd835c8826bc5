//! Subscription registry for WebSocket sessions
//!
//! Maps each symbol to the set of sessions subscribed to it (its "room") and
//! owns the bounded per-session outboxes the dispatcher pushes updates into.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tickstream_core::{ServerMessage, Symbol};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Unique identifier for a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Capacity of each session's outbox. When full, further deliveries to that
/// session are dropped; only the latest value matters.
const OUTBOX_CAPACITY: usize = 64;

/// Manages room membership and per-session delivery channels
pub struct SubscriptionRegistry {
    /// Next session ID to assign
    next_session_id: AtomicU64,
    /// Map of symbol -> set of sessions in that room; empty rooms are removed
    rooms: DashMap<Symbol, HashSet<SessionId>>,
    /// Map of session -> symbols it subscribed to (for disconnect cleanup)
    session_symbols: DashMap<SessionId, HashSet<Symbol>>,
    /// Map of session -> bounded outbox for outgoing messages
    outboxes: DashMap<SessionId, mpsc::Sender<ServerMessage>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_session_id: AtomicU64::new(1),
            rooms: DashMap::new(),
            session_symbols: DashMap::new(),
            outboxes: DashMap::new(),
        }
    }

    /// Allocate a new unique session ID
    pub fn new_session_id(&self) -> SessionId {
        SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a session's outbox and return the receiving half.
    ///
    /// The send task drains the receiver; dropping it (session teardown)
    /// makes every later delivery to this session a no-op.
    pub fn register_session(&self, session_id: SessionId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.outboxes.insert(session_id, tx);
        rx
    }

    /// Add a session to a symbol's room. Re-joining is a no-op.
    pub fn join(&self, symbol: &Symbol, session_id: SessionId) {
        self.rooms
            .entry(symbol.clone())
            .or_default()
            .insert(session_id);

        self.session_symbols
            .entry(session_id)
            .or_default()
            .insert(symbol.clone());

        debug!("{} joined room {}", session_id, symbol);
    }

    /// Remove a session from a symbol's room, pruning the room if it empties.
    /// Leaving a room the session is not in is a no-op.
    pub fn leave(&self, symbol: &Symbol, session_id: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(symbol) {
            members.remove(&session_id);
            let empty = members.is_empty();
            drop(members);
            if empty {
                // Guarded removal: a concurrent join may have repopulated
                // the room between the drop above and this call
                self.rooms.remove_if(symbol, |_, members| members.is_empty());
            }
        }

        if let Some(mut symbols) = self.session_symbols.get_mut(&session_id) {
            symbols.remove(symbol);
        }

        debug!("{} left room {}", session_id, symbol);
    }

    /// Remove a session from every room it belongs to and drop its outbox.
    ///
    /// Called on disconnect; safe to call more than once and safe to race
    /// against an in-flight broadcast (the broadcast either reaches the
    /// closing outbox, where it is discarded, or finds the session gone).
    pub fn remove_session(&self, session_id: SessionId) {
        self.outboxes.remove(&session_id);

        if let Some((_, symbols)) = self.session_symbols.remove(&session_id) {
            for symbol in symbols {
                if let Some(mut members) = self.rooms.get_mut(&symbol) {
                    members.remove(&session_id);
                    let empty = members.is_empty();
                    drop(members);
                    if empty {
                        self.rooms.remove_if(&symbol, |_, members| members.is_empty());
                    }
                }
            }
            info!("{} disconnected, removed all subscriptions", session_id);
        }
    }

    /// Snapshot of the sessions currently in a symbol's room
    pub fn members_of(&self, symbol: &Symbol) -> HashSet<SessionId> {
        self.rooms
            .get(symbol)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    /// Whether a session is currently in a symbol's room
    pub fn is_subscribed(&self, session_id: SessionId, symbol: &Symbol) -> bool {
        self.session_symbols
            .get(&session_id)
            .map(|symbols| symbols.contains(symbol))
            .unwrap_or(false)
    }

    /// Whether any room exists for the symbol
    pub fn has_room(&self, symbol: &Symbol) -> bool {
        self.rooms.contains_key(symbol)
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Deliver a message to one session, best-effort
    pub fn send_to(&self, session_id: SessionId, message: ServerMessage) {
        self.try_deliver(session_id, &message);
    }

    /// Deliver a message to every member of a symbol's room.
    ///
    /// Delivery is fire-and-forget per session: a full or closed outbox
    /// drops that one delivery and never blocks the others.
    pub fn broadcast_to_room(&self, symbol: &Symbol, message: ServerMessage) {
        for session_id in self.members_of(symbol) {
            self.try_deliver(session_id, &message);
        }
    }

    fn try_deliver(&self, session_id: SessionId, message: &ServerMessage) {
        let Some(tx) = self.outboxes.get(&session_id) else {
            return;
        };
        match tx.try_send(message.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Outbox full for {}, dropping update", session_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbox closed for {}, dropping update", session_id);
            }
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("rooms", &self.room_count())
            .field("sessions", &self.session_count())
            .finish()
    }
}
