use thiserror::Error;

/// Failures reported by [`crate::chat::hub::Hub`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Attempt to create duplicate room: {0}")]
    DuplicateRoom(String),
    #[error("Unknown room: {0}")]
    UnknownRoom(String),
    /// `nick` is the nick already present in the room, as it was registered.
    #[error("User {nick} already joined {room}")]
    NickTaken { nick: String, room: String },
}

/// Failures while loading [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("at least one room must be configured")]
    NoRooms,
    #[error("room names must not be empty")]
    EmptyRoomName,
}
