//! Command model and validation rules.
//!
//! One inbound message classifies into exactly one `Command` variant; `!taxa`
//! arguments are validated here, short-circuiting on the first failing rule.
//! Validation is pure: no store access happens before a message passes.

use thiserror::Error;

use crate::ledger::Category;

/// Accepted amount bounds, inclusive.
pub const MIN_AMOUNT: i64 = 100_000;
pub const MAX_AMOUNT: i64 = 300_000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("wrong argument count for !taxa")]
    MalformedCommand,
    #[error("player id is not numeric")]
    InvalidPlayerId,
    #[error("amount is not numeric")]
    InvalidAmount,
    #[error("amount outside accepted bounds")]
    AmountOutOfRange,
    #[error("unknown tax category")]
    UnknownCategory,
}

impl CommandError {
    /// The fixed reply sent to the channel for this failure kind.
    pub fn user_reply(self) -> &'static str {
        match self {
            CommandError::MalformedCommand => {
                "Comanda gresita. Asigura-te ca ai dat toate datele necesare (`idPlayer`, `suma`, `locatie`)."
            }
            CommandError::InvalidPlayerId => "ID invalid.",
            CommandError::InvalidAmount => "Suma invalida.",
            CommandError::AmountOutOfRange => {
                "Suma trebuie sa fie intre `100000` si `300000`."
            }
            CommandError::UnknownCategory => {
                "Locatie necunoscuta. Foloseste `iarba` sau `pcp`."
            }
        }
    }
}

/// A validated `!taxa` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxEntry {
    /// Numeric-only by contract; kept as the original token for replies.
    pub player_id: String,
    pub amount: i64,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Summary,
    Reset,
    Tax(TaxEntry),
    Unknown,
}

impl Command {
    /// Classify one message body. The first whitespace token selects the
    /// command (case-sensitive, `!`-prefixed); everything else is `Unknown`.
    pub fn classify(text: &str) -> Result<Command, CommandError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.first().copied() {
            Some("!help") => Ok(Command::Help),
            Some("!suma") => Ok(Command::Summary),
            Some("!reset") => Ok(Command::Reset),
            Some("!taxa") => validate_tax(&tokens).map(Command::Tax),
            _ => Ok(Command::Unknown),
        }
    }
}

fn validate_tax(tokens: &[&str]) -> Result<TaxEntry, CommandError> {
    // Command name plus exactly three arguments.
    if tokens.len() != 4 {
        return Err(CommandError::MalformedCommand);
    }

    let player_id = tokens[1];
    if player_id.parse::<u64>().is_err() {
        return Err(CommandError::InvalidPlayerId);
    }

    let amount: i64 = tokens[2].parse().map_err(|_| CommandError::InvalidAmount)?;
    if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&amount) {
        return Err(CommandError::AmountOutOfRange);
    }

    let category = Category::parse(&tokens[3].to_lowercase())
        .ok_or(CommandError::UnknownCategory)?;

    Ok(TaxEntry {
        player_id: player_id.to_string(),
        amount,
        category,
    })
}
