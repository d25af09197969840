pub mod commands;
pub mod hub;
pub mod service;
pub mod sessions;

pub use commands::{Command, PublishCommand, SubscribeCommand};
pub use hub::{HistoryItem, Hub, Sink, Subscriber};
pub use service::{Service, Unsubscriber};
pub use sessions::SessionRegistry;
