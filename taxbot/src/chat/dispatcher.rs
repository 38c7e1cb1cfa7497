//! Single-shot classify-and-route for inbound messages.
//!
//! Handlers return a `CommandOutcome` instead of talking to the transport;
//! the gateway performs the reply and arms the reminder.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::command::{Command, TaxEntry, MAX_AMOUNT, MIN_AMOUNT};
use crate::ledger::store::{LedgerStore, StoreError};
use crate::ledger::{LedgerRecord, TotalsReport};
use crate::policy::ResetPolicy;

use super::connector::MessageEnvelope;
use super::scheduler::ReminderTask;

/// What a handled command wants done: one reply, optionally one armed
/// reminder.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub reply: String,
    pub reminder: Option<ReminderTask>,
}

impl CommandOutcome {
    fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            reminder: None,
        }
    }
}

pub struct Dispatcher {
    channel_id: String,
    policy: ResetPolicy,
    store: Arc<dyn LedgerStore>,
    reminder_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        channel_id: String,
        policy: ResetPolicy,
        store: Arc<dyn LedgerStore>,
        reminder_delay: Duration,
    ) -> Self {
        Self {
            channel_id,
            policy,
            store,
            reminder_delay,
        }
    }

    /// Handle one inbound envelope. `None` means the message was filtered
    /// out (automated sender or foreign channel) and gets no reply. A store
    /// error aborts the response path; validation failures are answered
    /// like any other command.
    pub async fn handle(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<Option<CommandOutcome>, StoreError> {
        if envelope.sender_is_bot {
            return Ok(None);
        }
        if envelope.channel_id != self.channel_id {
            debug!(
                "[Dispatcher] Ignoring message {} from foreign channel {}",
                envelope.id, envelope.channel_id
            );
            return Ok(None);
        }

        let command = match Command::classify(&envelope.text) {
            Ok(command) => command,
            Err(e) => return Ok(Some(CommandOutcome::reply_only(e.user_reply()))),
        };

        match command {
            Command::Help => Ok(Some(CommandOutcome::reply_only(self.help_text()))),
            Command::Summary => {
                let record = self.store.get().await?;
                let report = TotalsReport::from_record(&record);
                Ok(Some(CommandOutcome::reply_only(summary_reply(&report))))
            }
            Command::Reset => self.handle_reset(envelope).await,
            Command::Tax(entry) => self.handle_tax(envelope, entry).await,
            Command::Unknown => Ok(Some(CommandOutcome::reply_only(unknown_reply()))),
        }
    }

    async fn handle_reset(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<Option<CommandOutcome>, StoreError> {
        if !self.policy.can_reset(&envelope.sender_id) {
            info!(
                "[Dispatcher] Reset denied for sender {}",
                envelope.sender_id
            );
            return Ok(Some(CommandOutcome::reply_only("N-ai voie.")));
        }

        self.store.put(LedgerRecord::zeroed()).await?;
        info!("[Dispatcher] Ledger reset by {}", envelope.sender_id);
        Ok(Some(CommandOutcome::reply_only("Taxele au fost resetate.")))
    }

    async fn handle_tax(
        &self,
        envelope: &MessageEnvelope,
        entry: TaxEntry,
    ) -> Result<Option<CommandOutcome>, StoreError> {
        let record = self.store.increment(entry.category, entry.amount).await?;
        debug!(
            "[Dispatcher] Recorded {} for {} ({} now at {})",
            entry.amount,
            entry.player_id,
            entry.category.field(),
            record.total_for(entry.category)
        );

        let reminder = ReminderTask::new(
            envelope.channel_id.clone(),
            envelope.sender_id.clone(),
            entry.player_id.clone(),
            entry.category,
            self.reminder_delay,
        );

        Ok(Some(CommandOutcome {
            reply: tax_reply(&entry),
            reminder: Some(reminder),
        }))
    }

    fn help_text(&self) -> String {
        format!(
            ":cherry_blossom:  **`!taxa <idPlayer> <suma> <locatie>` • Inregistreaza o taxa**\n\
             \n\
             Tine cont de urmatoarele:\n\
             - `idPlayer` trebuie sa fie valid.\n\
             - `suma` trebuie sa fie intre `{min}` si `{max}`.\n\
             - `locatie` poate fi doar `iarba` sau `pcp`.\n\
             \n\
             Taxa va fi valabila **1 ora**; vei fi anuntat odata ce expira.\n\
             \n\
             :cherry_blossom:  **`!suma` • Vezi cat s-a strans pana acum din taxe**\n\
             \n\
             :cherry_blossom:  **`!reset` • Reseteaza taxele (doar {admin} poate face asta deocamdata)**",
            min = MIN_AMOUNT,
            max = MAX_AMOUNT,
            admin = self.policy.admin_mention()
        )
    }
}

fn summary_reply(report: &TotalsReport) -> String {
    format!(
        "Suma totala acumulata pana acum este de **${combined}**, dintre care:\n\
         - **${weed}** de la campul de **iarba**.\n\
         - **${pcp}** de la campul de **piperidina**.",
        combined = report.combined,
        weed = report.weed,
        pcp = report.pcp
    )
}

fn tax_reply(entry: &TaxEntry) -> String {
    format!(
        "Taxa de **${amount}** ridicata de la **#{player}** la campul de **{label}**. \
         Te anunt intr-o ora cand trebuie sa ridici taxa din nou.",
        amount = entry.amount,
        player = entry.player_id,
        label = entry.category.label()
    )
}

fn unknown_reply() -> String {
    "Comanda gresita. Poti folosi doar una din urmatoarele:\n\
     - `!help`\n\
     - `!suma`\n\
     - `!taxa <idPlayer> <suma> <locatie>`"
        .to_string()
}
