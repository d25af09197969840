use std::path::Path;

use serde::Deserialize;

use crate::chat::service::DEFAULT_OUTBOUND_BUFFER;
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ROOMS: [&str; 3] = ["A", "B", "C"];
const DEFAULT_HISTORY_CAPACITY: usize = 128;
const DEFAULT_MESSAGE_CAP: usize = 254;

/// Chat server configuration.
///
/// Sources, lowest priority first: built-in defaults, an optional JSON file,
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Port the TCP listener binds to.
    pub port: u16,
    /// Rooms created at startup. No rooms can be added afterwards.
    pub rooms: Vec<String>,
    /// Messages kept per room and replayed to new subscribers.
    pub history_capacity: usize,
    /// Maximum length of a published message, in bytes.
    pub message_cap: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

/// Shape of the optional JSON config file. Keys may be snake_case or
/// PascalCase (`{"Port": 5000, "Rooms": ["A", "B"]}`).
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default, alias = "Port")]
    port: Option<PortValue>,
    #[serde(default, alias = "Rooms")]
    rooms: Option<Vec<String>>,
    #[serde(default, alias = "HistoryCapacity")]
    history_capacity: Option<usize>,
    #[serde(default, alias = "MessageCap")]
    message_cap: Option<usize>,
    #[serde(default, alias = "OutboundBuffer")]
    outbound_buffer: Option<usize>,
}

/// The original server wrote its port as a string (`"Port": "5000"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn into_port(self) -> Result<u16, ConfigError> {
        match self {
            PortValue::Number(port) => Ok(port),
            PortValue::Text(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "Port", value }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rooms: DEFAULT_ROOMS.iter().map(|r| r.to_string()).collect(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            message_cap: DEFAULT_MESSAGE_CAP,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from `HOSTEL_CONFIG` (default `config.json`, skipped
    /// if missing) and environment variables.
    ///
    /// Recognised variables: `PORT`, `ROOMS` (`A|B|C`), `HISTORY_CAPACITY`,
    /// `MESSAGE_CAP`, `OUTBOUND_BUFFER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable lookup.
    pub fn load(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = var("HOSTEL_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::default();
        if let Some(file) = read_file(Path::new(&path))? {
            config.apply_file(file)?;
        }
        config.apply_env(&var)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(port) = file.port {
            self.port = port.into_port()?;
        }
        if let Some(rooms) = file.rooms {
            self.rooms = rooms;
        }
        if let Some(capacity) = file.history_capacity {
            self.history_capacity = capacity;
        }
        if let Some(cap) = file.message_cap {
            self.message_cap = cap;
        }
        if let Some(buffer) = file.outbound_buffer {
            self.outbound_buffer = buffer;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = parsed_var(var, "PORT")? {
            self.port = port;
        }
        if let Some(rooms) = var("ROOMS").filter(|s| !s.is_empty()) {
            self.rooms = rooms.split('|').map(str::to_string).collect();
        }
        if let Some(capacity) = parsed_var(var, "HISTORY_CAPACITY")? {
            self.history_capacity = capacity;
        }
        if let Some(cap) = parsed_var(var, "MESSAGE_CAP")? {
            self.message_cap = cap;
        }
        if let Some(buffer) = parsed_var(var, "OUTBOUND_BUFFER")? {
            self.outbound_buffer = buffer;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rooms.is_empty() {
            return Err(ConfigError::NoRooms);
        }
        if self.rooms.iter().any(|room| room.is_empty()) {
            return Err(ConfigError::EmptyRoomName);
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                name: "OUTBOUND_BUFFER",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
}

fn parsed_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match var(name).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(None),
    }
}
