//! Gateway wiring: store selection, connector session, dispatch effects.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::ledger::store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore, StoreError};
use crate::policy::ResetPolicy;

use super::connector::{
    ChatConnector, ConnectionHandle, ConnectorError, EnvelopeCallback, LoopbackConnectorConfig,
    LoopbackWebhookConnector, MessageEnvelope, OutboundRequest,
};
use super::dispatcher::Dispatcher;
use super::scheduler::ReminderScheduler;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ChatGatewayConfig {
    /// The single channel the ledger listens on.
    pub channel_id: String,
    /// Identity allowed to reset; also the identity named in help text.
    pub admin_id: String,
    /// SQLite database path; in-memory ledger when absent.
    pub ledger_db: Option<PathBuf>,
    pub reminder_delay_ms: i64,
    pub connector: LoopbackConnectorConfig,
}

#[derive(Clone)]
pub struct ChatGateway {
    state: Arc<GatewayState>,
}

struct GatewayState {
    dispatcher: Dispatcher,
    scheduler: Arc<ReminderScheduler>,
    connector: Arc<dyn ChatConnector>,
    connector_handle: ConnectionHandle,
}

impl ChatGateway {
    /// Wire everything up and serve until the process is stopped.
    pub async fn start(config: ChatGatewayConfig) -> Result<(), GatewayError> {
        let store: Arc<dyn LedgerStore> = match &config.ledger_db {
            Some(path) => Arc::new(SqliteLedgerStore::new(path.clone())?),
            None => Arc::new(InMemoryLedgerStore::new()),
        };

        let dispatcher = Dispatcher::new(
            config.channel_id.clone(),
            ResetPolicy::single(config.admin_id.clone()),
            store,
            Duration::milliseconds(config.reminder_delay_ms),
        );

        let scheduler = Arc::new(ReminderScheduler::new());
        let connector: Arc<dyn ChatConnector> =
            Arc::new(LoopbackWebhookConnector::new(config.connector.clone()));
        let handle = connector.connect().await?;
        info!(
            "[Gateway] Watching channel {} (reminders after {}ms)",
            config.channel_id, config.reminder_delay_ms
        );

        let state = Arc::new(GatewayState {
            dispatcher,
            scheduler: scheduler.clone(),
            connector: connector.clone(),
            connector_handle: handle.clone(),
        });

        let gateway = ChatGateway {
            state: state.clone(),
        };
        let callback: EnvelopeCallback = Arc::new(move |envelope| {
            let gateway = gateway.clone();
            Box::pin(async move {
                gateway.handle_inbound(envelope).await;
                Ok(())
            })
        });
        connector.subscribe(&handle, callback).await?;

        scheduler.start(connector, handle).await;
        Ok(())
    }

    /// Process one envelope end to end: dispatch, reply, arm the reminder.
    /// Command errors never escape; a store failure aborts the response
    /// path with an operator-facing log and no retry.
    async fn handle_inbound(&self, envelope: MessageEnvelope) {
        let outcome = match self.state.dispatcher.handle(&envelope).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return,
            Err(e) => {
                error!(
                    "[Gateway] Command in message {} not completed: {}",
                    envelope.id, e
                );
                return;
            }
        };

        let reply = OutboundRequest {
            channel_id: envelope.channel_id.clone(),
            content: outcome.reply,
            reply_to: Some(envelope.id.clone()),
        };
        if let Err(e) = self
            .state
            .connector
            .send(&self.state.connector_handle, reply)
            .await
        {
            // Fire-and-forget: no delivery confirmation is consumed.
            error!("[Gateway] Reply to message {} failed: {}", envelope.id, e);
        }

        if let Some(task) = outcome.reminder {
            self.state.scheduler.submit(task);
        }
    }
}
