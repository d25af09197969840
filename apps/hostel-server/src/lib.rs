pub mod chat;
pub mod config;
pub mod error;
pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use chat::{Command, Hub, PublishCommand, Service, SubscribeCommand};
use config::Config;
use error::HubError;
use hostel_common::protocol::{PUBLISH, SUBSCRIBE};

/// Everything a running server shares across connections.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub service: Service,
}

impl AppState {
    /// Build the hub with the configured rooms and wire up the command table.
    pub fn from_config(config: Config) -> Result<Self, HubError> {
        let mut hub = Hub::new(config.history_capacity);
        for room in &config.rooms {
            hub.create_room(room)?;
        }
        // The room set is fixed from here on.
        let hub = Arc::new(hub);

        let mut commands: HashMap<String, Arc<dyn Command>> = HashMap::new();
        commands.insert(
            SUBSCRIBE.to_string(),
            Arc::new(SubscribeCommand::new(hub.clone())),
        );
        commands.insert(
            PUBLISH.to_string(),
            Arc::new(PublishCommand::new(hub.clone(), config.message_cap)),
        );

        let service = Service::new(commands, hub.clone(), config.outbound_buffer);

        Ok(Self {
            config: Arc::new(config),
            hub,
            service,
        })
    }
}
