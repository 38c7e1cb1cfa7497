//! Chat surface: connector seam, command dispatch, reminder scheduling.

pub mod connector;
pub mod dispatcher;
pub mod gateway;
pub mod scheduler;

pub use connector::{
    ChatConnector, ConnectionHandle, ConnectorError, EnvelopeCallback, HealthStatus,
    LoopbackConnectorConfig, LoopbackWebhookConnector, MessageEnvelope, OutboundRequest,
    SendResult,
};
pub use dispatcher::{CommandOutcome, Dispatcher};
pub use gateway::{ChatGateway, ChatGatewayConfig, GatewayError};
pub use scheduler::{ReminderScheduler, ReminderTask, REMINDER_DELAY_MS};
