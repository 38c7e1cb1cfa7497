//! One-shot pickup reminders.
//!
//! Every recorded tax entry arms one independent task; tasks are never
//! merged, cancelled or rescheduled, and they live only in memory. A
//! restart silently drops whatever is pending.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::Category;

use super::connector::{ChatConnector, ConnectionHandle, OutboundRequest};

/// Delay between a recorded entry and its pickup reminder.
pub const REMINDER_DELAY_MS: i64 = 3_600_000;

#[derive(Debug, Clone)]
pub struct ReminderTask {
    pub id: String,
    pub due_at: DateTime<Utc>,
    pub channel_id: String,
    /// Who recorded the entry; the reminder mentions them.
    pub requester_id: String,
    pub player_id: String,
    pub category: Category,
}

impl ReminderTask {
    pub fn new(
        channel_id: String,
        requester_id: String,
        player_id: String,
        category: Category,
        delay: Duration,
    ) -> Self {
        Self {
            id: format!("reminder-{}", Uuid::new_v4()),
            due_at: Utc::now() + delay,
            channel_id,
            requester_id,
            player_id,
            category,
        }
    }

    pub fn notification_text(&self) -> String {
        format!(
            "<@{}>, mergi sa ridici taxa de la **#{}** la campul de **{}**!",
            self.requester_id,
            self.player_id,
            self.category.label()
        )
    }
}

pub struct ReminderScheduler {
    tasks: Mutex<Vec<ReminderTask>>,
}

impl ReminderScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Arm one reminder. Repeated entries for the same player and category
    /// each get their own task; there is no deduplication.
    pub fn submit(&self, task: ReminderTask) {
        info!(
            "[Scheduler] Reminder {} armed for {} (due {})",
            task.id, task.player_id, task.due_at
        );
        self.tasks.lock().expect("reminder store lock").push(task);
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().expect("reminder store lock").len()
    }

    /// Remove and return every task due at `now`. Removal under the lock is
    /// what makes each task fire exactly once.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<ReminderTask> {
        let mut guard = self.tasks.lock().expect("reminder store lock");
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(guard.len());
        for task in guard.drain(..) {
            if task.due_at <= now {
                due.push(task);
            } else {
                remaining.push(task);
            }
        }
        *guard = remaining;
        due
    }

    pub async fn start(
        self: Arc<Self>,
        connector: Arc<dyn ChatConnector>,
        handle: ConnectionHandle,
    ) {
        info!("[Scheduler] Starting reminder loop...");
        let mut tick = interval(TokioDuration::from_secs(1));

        loop {
            tick.tick().await;
            self.fire_due(connector.as_ref(), &handle).await;
        }
    }

    /// Fire every due task: one outbound notification each, no retry on
    /// delivery failure.
    pub async fn fire_due(&self, connector: &dyn ChatConnector, handle: &ConnectionHandle) {
        for task in self.take_due(Utc::now()) {
            let outbound = OutboundRequest {
                channel_id: task.channel_id.clone(),
                content: task.notification_text(),
                reply_to: None,
            };
            match connector.send(handle, outbound).await {
                Ok(result) if result.success => {
                    info!("[Scheduler] Reminder {} delivered", task.id);
                }
                Ok(result) => {
                    warn!(
                        "[Scheduler] Reminder {} dropped: {}",
                        task.id,
                        result.error.unwrap_or_else(|| "unknown".to_string())
                    );
                }
                Err(e) => {
                    warn!("[Scheduler] Reminder {} dropped: {}", task.id, e);
                }
            }
        }
    }
}

impl Default for ReminderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::connector::{ConnectorError, EnvelopeCallback, HealthStatus, SendResult};
    use async_trait::async_trait;

    struct RecordingConnector {
        sent: Mutex<Vec<OutboundRequest>>,
    }

    impl RecordingConnector {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<OutboundRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatConnector for RecordingConnector {
        async fn connect(&self) -> Result<ConnectionHandle, ConnectorError> {
            Ok(ConnectionHandle {
                id: "recording".to_string(),
                bind_addr: "test".to_string(),
            })
        }

        async fn disconnect(&self, _handle: &ConnectionHandle) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn subscribe(
            &self,
            _handle: &ConnectionHandle,
            _callback: EnvelopeCallback,
        ) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn send(
            &self,
            _handle: &ConnectionHandle,
            outbound: OutboundRequest,
        ) -> Result<SendResult, ConnectorError> {
            self.sent.lock().unwrap().push(outbound);
            Ok(SendResult {
                success: true,
                message_id: Some("m".to_string()),
                error: None,
            })
        }

        async fn health(&self, _handle: &ConnectionHandle) -> Result<HealthStatus, ConnectorError> {
            Ok(HealthStatus {
                ok: true,
                details: None,
            })
        }
    }

    fn handle() -> ConnectionHandle {
        ConnectionHandle {
            id: "recording".to_string(),
            bind_addr: "test".to_string(),
        }
    }

    fn task_due_in(ms: i64) -> ReminderTask {
        ReminderTask::new(
            "chan-1".to_string(),
            "author-9".to_string(),
            "42".to_string(),
            Category::Weed,
            Duration::milliseconds(ms),
        )
    }

    #[tokio::test]
    async fn due_task_fires_exactly_once() {
        let scheduler = ReminderScheduler::new();
        let connector = RecordingConnector::new();

        scheduler.submit(task_due_in(-1));
        assert_eq!(scheduler.pending(), 1);

        scheduler.fire_due(&connector, &handle()).await;
        assert_eq!(connector.sent().len(), 1);
        assert_eq!(scheduler.pending(), 0);

        // Second pass finds nothing left to fire.
        scheduler.fire_due(&connector, &handle()).await;
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn not_yet_due_task_stays_pending() {
        let scheduler = ReminderScheduler::new();
        let connector = RecordingConnector::new();

        scheduler.submit(task_due_in(60_000));
        scheduler.fire_due(&connector, &handle()).await;

        assert_eq!(connector.sent().len(), 0);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn repeated_entries_arm_independent_reminders() {
        let scheduler = ReminderScheduler::new();
        let connector = RecordingConnector::new();

        scheduler.submit(task_due_in(-1));
        scheduler.submit(task_due_in(-1));
        scheduler.fire_due(&connector, &handle()).await;

        assert_eq!(connector.sent().len(), 2);
    }

    #[tokio::test]
    async fn notification_references_requester_player_and_category() {
        let scheduler = ReminderScheduler::new();
        let connector = RecordingConnector::new();

        scheduler.submit(task_due_in(-1));
        scheduler.fire_due(&connector, &handle()).await;

        let sent = connector.sent();
        assert_eq!(sent[0].channel_id, "chan-1");
        assert!(sent[0].content.contains("<@author-9>"));
        assert!(sent[0].content.contains("#42"));
        assert!(sent[0].content.contains("iarba"));
        assert!(sent[0].reply_to.is_none());
    }

    #[test]
    fn due_at_honours_the_configured_delay() {
        let before = Utc::now();
        let task = ReminderTask::new(
            "c".to_string(),
            "r".to_string(),
            "1".to_string(),
            Category::Pcp,
            Duration::milliseconds(REMINDER_DELAY_MS),
        );
        let offset = task.due_at - before;
        assert!(offset >= Duration::milliseconds(REMINDER_DELAY_MS - 1_000));
        assert!(offset <= Duration::milliseconds(REMINDER_DELAY_MS + 1_000));
    }
}
