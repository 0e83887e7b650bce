//! Common types shared across modules.

use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::{ParsePubkeyError, Pubkey};
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One row of the recipient form: raw user text, validated only at send time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub amount: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// Editable field of a [`Recipient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientField {
    Address,
    Amount,
}

/// A fungible token the user can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Mint address (base58)
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default, rename = "logoURI", skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl TokenDescriptor {
    pub fn mint(&self) -> Result<Pubkey, ParsePubkeyError> {
        Pubkey::from_str(&self.address)
    }

    /// The wrapped-SOL mint stands in for the native coin.
    pub fn is_native(&self) -> bool {
        self.mint().map(|m| m == spl_token::native_mint::id()).unwrap_or(false)
    }
}

/// Fixed-point amount in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub const fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub const fn zero(decimals: u8) -> Self {
        Self { raw: 0, decimals }
    }

    pub const fn lamports(raw: u64) -> Self {
        Self::new(raw, utils::SOL_DECIMALS)
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Abbreviated rendering for balance displays.
    pub fn display_short(&self) -> String {
        utils::format_balance(self.raw, self.decimals)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&utils::format_units(self.raw, self.decimals))
    }
}

/// Token balances keyed by mint address. Replaced wholesale on every poll.
pub type BalanceSnapshot = HashMap<String, TokenAmount>;

/// Where a send attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    Building,
    Simulating,
    /// Stopped before anything was broadcast
    Rejected,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    /// Broadcast, but the chain reported an error (or the send itself failed)
    Failed,
    /// Blockhash expired before confirmation was observed
    TimedOut,
}

impl SendStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SendStage::Rejected | SendStage::Confirmed | SendStage::Failed | SendStage::TimedOut
        )
    }

    /// Progress text for the non-terminal stages.
    pub fn progress_text(&self, token_mode: bool) -> Option<&'static str> {
        match (self, token_mode) {
            (SendStage::Building, false) => Some("Creating transaction..."),
            (SendStage::Building, true) => Some("Creating token transaction..."),
            (SendStage::Simulating, _) => Some("Simulating transaction..."),
            (SendStage::Submitting, false) => Some("Sending transaction..."),
            (SendStage::Submitting, true) => Some("Sending token transaction..."),
            (SendStage::AwaitingConfirmation, _) => Some("Confirming transaction..."),
            _ => None,
        }
    }
}

/// Outcome of one send attempt, kept until the next attempt starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub signature: Option<Signature>,
    pub stage: SendStage,
    /// User-facing status line
    pub status: String,
    /// Raw error detail for logs
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl SubmissionResult {
    pub const CONFIRMED_STATUS: &'static str = "Transaction confirmed!";

    pub fn confirmed(signature: Signature) -> Self {
        Self {
            signature: Some(signature),
            stage: SendStage::Confirmed,
            status: Self::CONFIRMED_STATUS.to_string(),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        stage: SendStage,
        signature: Option<Signature>,
        status: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            signature,
            stage,
            status: status.into(),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.stage == SendStage::Confirmed
    }
}
