//! Form validation run before any network call.

use crate::types::{Recipient, TokenDescriptor};
use crate::utils;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use thiserror::Error;

/// Input problems. The display text is the status line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please connect your wallet first")]
    WalletNotConnected,
    #[error("Please add at least one recipient")]
    NoRecipients,
    #[error("Please fill in all recipient addresses and amounts")]
    MissingField,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("All amounts must be positive numbers")]
    InvalidAmount,
    #[error("Please select a token")]
    NoTokenSelected,
    #[error("Amount {amount} is smaller than the smallest unit of {symbol}")]
    AmountTooSmall { amount: String, symbol: String },
    #[error("Amount {amount} is too large for {symbol}")]
    AmountTooLarge { amount: String, symbol: String },
}

pub(crate) fn parse_address(address: &str) -> Result<Pubkey, ValidationError> {
    Pubkey::from_str(address.trim())
        .map_err(|_| ValidationError::InvalidAddress(address.to_string()))
}

/// Check the send form. The first failing check wins.
pub fn validate(
    wallet: Option<&Pubkey>,
    recipients: &[Recipient],
    sending_native: bool,
    selected_token: Option<&TokenDescriptor>,
) -> Result<(), ValidationError> {
    if wallet.is_none() {
        return Err(ValidationError::WalletNotConnected);
    }

    if recipients.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    for recipient in recipients {
        if recipient.address.trim().is_empty() || recipient.amount.trim().is_empty() {
            return Err(ValidationError::MissingField);
        }

        parse_address(&recipient.address)?;

        if !utils::is_positive_decimal(&recipient.amount) {
            return Err(ValidationError::InvalidAmount);
        }
    }

    if !sending_native && selected_token.is_none() {
        return Err(ValidationError::NoTokenSelected);
    }

    Ok(())
}
