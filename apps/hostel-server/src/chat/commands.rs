//! `subscribe` and `publish` command handlers.

use std::sync::Arc;

use async_trait::async_trait;
use hostel_common::protocol::{public_message, split_first, DELIMITER, PAIR_SEPARATOR};
use hostel_common::Identity;

use crate::error::HubError;

use super::hub::{HistoryItem, Hub, Sink, Subscriber};

/// An action a connected client can request with `<name>|<args>`.
///
/// Handlers report every outcome as text on `outgoing`, the calling
/// connection's own sink; they never fail the connection.
#[async_trait]
pub trait Command: Send + Sync {
    async fn handle(&self, identity: &Identity, args: &str, outgoing: &Sink);
}

/// Queue `line` on a connection's sink. A closed sink means that connection
/// is already going away, so the line is dropped.
pub(crate) async fn deliver(sink: &Sink, line: String) {
    if sink.send(line).await.is_err() {
        tracing::debug!("dropping line for closed connection");
    }
}

// ---------------------------------------------------------------------------
// subscribe|room1:nick1|room2:nick2
// ---------------------------------------------------------------------------

/// Lets clients join rooms under a per-room nick.
pub struct SubscribeCommand {
    hub: Arc<Hub>,
}

impl SubscribeCommand {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Split the batch into `(room, nick)` pairs. The first malformed pair
    /// rejects the whole batch.
    fn parse_pairs(args: &str) -> Result<Vec<(&str, &str)>, String> {
        args.split(DELIMITER)
            .map(|pair| {
                let (room, nick) = pair.split_once(PAIR_SEPARATOR).unwrap_or((pair, ""));
                if room.is_empty() {
                    Err("Room name is missing.".to_string())
                } else if nick.is_empty() {
                    Err(format!("Nickname for {room} is missing."))
                } else {
                    Ok((room, nick))
                }
            })
            .collect()
    }
}

#[async_trait]
impl Command for SubscribeCommand {
    async fn handle(&self, identity: &Identity, args: &str, outgoing: &Sink) {
        let pairs = match Self::parse_pairs(args) {
            Ok(pairs) => pairs,
            Err(reply) => return deliver(outgoing, reply).await,
        };

        for (room, nick) in pairs {
            let subscriber = Subscriber::new(nick, outgoing.clone());
            if let Err(err) = self.hub.subscribe(identity.clone(), room, subscriber) {
                let reply = match err {
                    HubError::UnknownRoom(room) => {
                        format!("Cannot subscribe to unknown room: {room}.")
                    }
                    other => format!("{other}."),
                };
                deliver(outgoing, reply).await;
                continue;
            }

            tracing::debug!(identity = %identity, room, nick, "subscribed");
            for item in self.hub.list_history(room) {
                deliver(outgoing, public_message(&item.nick, room, &item.text)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// publish|room|message
// ---------------------------------------------------------------------------

/// Lets clients post to rooms they are subscribed to.
pub struct PublishCommand {
    hub: Arc<Hub>,
    /// Maximum message length in bytes.
    message_cap: usize,
}

impl PublishCommand {
    pub fn new(hub: Arc<Hub>, message_cap: usize) -> Self {
        Self { hub, message_cap }
    }

    fn parse<'a>(&self, args: &'a str) -> Result<(&'a str, &'a str), &'static str> {
        let (room, message) = split_first(args);
        if room.is_empty() {
            return Err("Target room name is missing.");
        }
        if message.trim().is_empty() {
            return Err("Message is empty.");
        }
        if message.len() > self.message_cap {
            return Err("Message is too long.");
        }
        Ok((room, message))
    }
}

#[async_trait]
impl Command for PublishCommand {
    async fn handle(&self, identity: &Identity, args: &str, outgoing: &Sink) {
        let (room, message) = match self.parse(args) {
            Ok(parsed) => parsed,
            Err(reply) => return deliver(outgoing, reply.to_string()).await,
        };

        // Authorization and fan-out share one snapshot.
        let subscribers = self.hub.list_subscribers(room);
        let Some(sender) = subscribers.get(identity) else {
            return deliver(outgoing, format!("You are not subscribed to {room}.")).await;
        };

        let line = public_message(&sender.nick, room, message);
        for (id, subscriber) in &subscribers {
            if id != identity {
                // Sequential awaited sends: a full sink stalls the rest of
                // this fan-out until its writer catches up.
                deliver(&subscriber.sink, line.clone()).await;
            }
        }

        if let Err(err) = self
            .hub
            .append_history(room, HistoryItem::new(sender.nick.clone(), message))
        {
            tracing::warn!(%err, room, "failed to record history");
        }
    }
}
