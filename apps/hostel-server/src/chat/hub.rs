//! In-memory room registry: per-room subscribers and bounded message history.
//!
//! Each room carries two independent locks so that appending history never
//! blocks a subscriber snapshot and vice versa. Both are `parking_lot`
//! primitives: a panicking command handler cannot poison a room.

use std::collections::{HashMap, VecDeque};

use hostel_common::Identity;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::HubError;

/// Outbound channel of a single connection. Every line sent here is written
/// to that connection's socket in FIFO order.
pub type Sink = mpsc::Sender<String>;

/// A connection's membership in one room.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub nick: String,
    pub sink: Sink,
}

impl Subscriber {
    pub fn new(nick: impl Into<String>, sink: Sink) -> Self {
        Self {
            nick: nick.into(),
            sink,
        }
    }
}

/// A message kept in a room's history and replayed to new subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub nick: String,
    pub text: String,
}

impl HistoryItem {
    pub fn new(nick: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            text: text.into(),
        }
    }
}

struct Room {
    subscribers: RwLock<HashMap<Identity, Subscriber>>,
    history: Mutex<VecDeque<HistoryItem>>,
}

impl Room {
    fn new(history_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
        }
    }
}

/// Shared chat state.
///
/// Rooms can only be created through `&mut self`, i.e. before the hub is
/// shared behind an `Arc`. Once traffic flows the room set is fixed, and all
/// mutation goes through the per-room locks.
pub struct Hub {
    rooms: HashMap<String, Room>,
    history_capacity: usize,
}

impl Hub {
    /// Create an empty hub whose rooms keep at most `history_capacity` messages.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            history_capacity,
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Add an empty room.
    pub fn create_room(&mut self, name: &str) -> Result<(), HubError> {
        if self.rooms.contains_key(name) {
            return Err(HubError::DuplicateRoom(name.to_string()));
        }
        self.rooms
            .insert(name.to_string(), Room::new(self.history_capacity));
        Ok(())
    }

    /// Names of all rooms, sorted.
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Subscribe `identity` to `room` under the subscriber's nick.
    ///
    /// The nick scan and the insert happen under one write lock, so two
    /// concurrent subscribes with the same nick cannot both succeed.
    pub fn subscribe(
        &self,
        identity: Identity,
        room: &str,
        subscriber: Subscriber,
    ) -> Result<(), HubError> {
        let entry = self
            .rooms
            .get(room)
            .ok_or_else(|| HubError::UnknownRoom(room.to_string()))?;

        let mut subscribers = entry.subscribers.write();
        let wanted = subscriber.nick.to_lowercase();
        if let Some(taken) = subscribers
            .values()
            .find(|existing| existing.nick.to_lowercase() == wanted)
        {
            return Err(HubError::NickTaken {
                nick: taken.nick.clone(),
                room: room.to_string(),
            });
        }
        subscribers.insert(identity, subscriber);
        Ok(())
    }

    /// Snapshot of the room's subscribers. Empty for an unknown room.
    pub fn list_subscribers(&self, room: &str) -> HashMap<Identity, Subscriber> {
        self.rooms
            .get(room)
            .map(|entry| entry.subscribers.read().clone())
            .unwrap_or_default()
    }

    /// Append to the room's history, evicting the oldest entries beyond capacity.
    pub fn append_history(&self, room: &str, item: HistoryItem) -> Result<(), HubError> {
        let entry = self
            .rooms
            .get(room)
            .ok_or_else(|| HubError::UnknownRoom(room.to_string()))?;

        let mut history = entry.history.lock();
        if self.history_capacity == 0 {
            return Ok(());
        }
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(item);
        Ok(())
    }

    /// Copy of the room's history, oldest first. Empty for an unknown room.
    pub fn list_history(&self, room: &str) -> Vec<HistoryItem> {
        self.rooms
            .get(room)
            .map(|entry| entry.history.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove `identity` from every room. Rooms are visited one at a time;
    /// there is no hub-wide lock.
    pub fn unsubscribe_all(&self, identity: &Identity) {
        for entry in self.rooms.values() {
            entry.subscribers.write().remove(identity);
        }
    }
}
