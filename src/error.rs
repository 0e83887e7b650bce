//! Error taxonomy for a send attempt and the mapping to status text.

use crate::rpc::RpcError;
use crate::simulator::SimulationFailure;
use crate::types::SendStage;
use crate::validation::ValidationError;
use crate::wallet::WalletError;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::program_error::ProgramError;
use solana_sdk::signature::Signature;
use solana_sdk::system_program;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

pub const INSUFFICIENT_BALANCE_MESSAGE: &str =
    "Wallet unable to complete the simulation. Please check your balance.";
pub const SIMULATION_FAILED_MESSAGE: &str =
    "Transaction simulation failed. Please try again with different parameters.";
pub const USER_REJECTED_MESSAGE: &str = "Transaction was rejected by the user.";

/// System program `ResultWithNegativeLamports` and SPL token
/// `InsufficientFunds` share custom code 1.
const INSUFFICIENT_FUNDS_CUSTOM_CODE: u32 = 1;

/// What the user should be told, independent of where the error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientFunds,
    SimulationFailed,
    UserRejected,
    Other,
}

/// Classify an on-chain error. `instructions` is the batch that produced it;
/// pass an empty slice when the batch is unknown.
pub fn classify_transaction_error(
    error: &TransactionError,
    instructions: &[Instruction],
) -> ErrorKind {
    match error {
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. }
        | TransactionError::InstructionError(_, InstructionError::InsufficientFunds) => {
            ErrorKind::InsufficientFunds
        }
        TransactionError::InstructionError(index, InstructionError::Custom(code))
            if *code == INSUFFICIENT_FUNDS_CUSTOM_CODE =>
        {
            match instructions.get(*index as usize) {
                Some(ix)
                    if ix.program_id == system_program::id()
                        || ix.program_id == spl_token::id() =>
                {
                    ErrorKind::InsufficientFunds
                }
                Some(_) => ErrorKind::Other,
                None => ErrorKind::InsufficientFunds,
            }
        }
        _ => ErrorKind::Other,
    }
}

fn mentions_custom_error_one(message: &str) -> bool {
    const NEEDLE: &str = "custom program error: 0x1";
    message.match_indices(NEEDLE).any(|(pos, _)| {
        message[pos + NEEDLE.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_hexdigit())
    })
}

/// Fallback for errors that only arrive as text (wallet and transport
/// messages).
pub fn classify_message(message: &str) -> ErrorKind {
    if message.contains("insufficient funds") || mentions_custom_error_one(message) {
        ErrorKind::InsufficientFunds
    } else if message.contains("Transaction simulation failed") {
        ErrorKind::SimulationFailed
    } else if message.contains("User rejected") {
        ErrorKind::UserRejected
    } else {
        ErrorKind::Other
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    InputInvalid(#[from] ValidationError),
    #[error(transparent)]
    SimulationRejected(#[from] SimulationFailure),
    #[error("{0}")]
    SubmissionRejected(#[from] WalletError),
    #[error("Transaction failed to confirm: {error}")]
    ConfirmationFailed {
        signature: Signature,
        error: TransactionError,
    },
    #[error("Transaction {signature} was not confirmed before its blockhash expired")]
    ConfirmationTimedOut { signature: Signature },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("Failed to build instruction: {0}")]
    Instruction(#[from] ProgramError),
    #[error("A transaction is already in progress")]
    SendInProgress,
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::SimulationRejected(SimulationFailure::InsufficientFunds { .. }) => {
                ErrorKind::InsufficientFunds
            }
            SendError::SimulationRejected(_) => ErrorKind::SimulationFailed,
            SendError::SubmissionRejected(WalletError::UserRejected) => ErrorKind::UserRejected,
            SendError::SubmissionRejected(WalletError::Preflight(err)) => {
                match classify_transaction_error(err, &[]) {
                    ErrorKind::InsufficientFunds => ErrorKind::InsufficientFunds,
                    _ => ErrorKind::SimulationFailed,
                }
            }
            SendError::SubmissionRejected(WalletError::Rpc(msg) | WalletError::Other(msg)) => {
                classify_message(msg)
            }
            SendError::ConfirmationFailed { error, .. } => classify_transaction_error(error, &[]),
            SendError::Rpc(RpcError::Transaction(err)) => classify_transaction_error(err, &[]),
            SendError::Rpc(RpcError::Transport(msg)) => classify_message(msg),
            _ => ErrorKind::Other,
        }
    }

    /// Signature of the broadcast transaction, when it got that far.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            SendError::ConfirmationFailed { signature, .. }
            | SendError::ConfirmationTimedOut { signature } => Some(*signature),
            _ => None,
        }
    }

    /// Terminal pipeline stage this error ends in.
    pub fn terminal_stage(&self) -> SendStage {
        match self {
            SendError::InputInvalid(_)
            | SendError::SimulationRejected(_)
            | SendError::SubmissionRejected(_)
            | SendError::Instruction(_)
            | SendError::SendInProgress => SendStage::Rejected,
            SendError::ConfirmationTimedOut { .. } => SendStage::TimedOut,
            SendError::ConfirmationFailed { .. } | SendError::Rpc(_) => SendStage::Failed,
        }
    }

    /// Status line for the user.
    pub fn user_message(&self) -> String {
        match self {
            SendError::InputInvalid(_)
            | SendError::SimulationRejected(_)
            | SendError::SendInProgress => self.to_string(),
            SendError::ConfirmationFailed { .. } => format!("Error: {}", self),
            SendError::ConfirmationTimedOut { signature } => format!(
                "Error: Transaction {} was not confirmed before its blockhash expired. \
                 Check the explorer before retrying.",
                signature
            ),
            _ => match self.kind() {
                ErrorKind::InsufficientFunds => format!("Error: {}", INSUFFICIENT_BALANCE_MESSAGE),
                ErrorKind::SimulationFailed => format!("Error: {}", SIMULATION_FAILED_MESSAGE),
                ErrorKind::UserRejected => format!("Error: {}", USER_REJECTED_MESSAGE),
                ErrorKind::Other => format!("Error: {}", self),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::compute_budget::ComputeBudgetInstruction;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::system_instruction;

    fn batch() -> Vec<Instruction> {
        let from = Pubkey::new_unique();
        vec![
            ComputeBudgetInstruction::set_compute_unit_limit(1_000_000),
            system_instruction::transfer(&from, &Pubkey::new_unique(), 10),
        ]
    }

    // ==================== classify_transaction_error tests ====================

    #[test]
    fn test_classify_fee_shortfall() {
        assert_eq!(
            classify_transaction_error(&TransactionError::InsufficientFundsForFee, &batch()),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            classify_transaction_error(
                &TransactionError::InsufficientFundsForRent { account_index: 2 },
                &batch()
            ),
            ErrorKind::InsufficientFunds
        );
    }

    #[test]
    fn test_classify_custom_one_from_system_program() {
        let err = TransactionError::InstructionError(1, InstructionError::Custom(1));
        assert_eq!(classify_transaction_error(&err, &batch()), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn test_classify_custom_one_from_other_program() {
        // Index 0 is the compute budget program
        let err = TransactionError::InstructionError(0, InstructionError::Custom(1));
        assert_eq!(classify_transaction_error(&err, &batch()), ErrorKind::Other);
    }

    #[test]
    fn test_classify_custom_one_without_batch() {
        let err = TransactionError::InstructionError(3, InstructionError::Custom(1));
        assert_eq!(classify_transaction_error(&err, &[]), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn test_classify_other_errors() {
        assert_eq!(
            classify_transaction_error(&TransactionError::AccountNotFound, &batch()),
            ErrorKind::Other
        );
        let err = TransactionError::InstructionError(1, InstructionError::Custom(4));
        assert_eq!(classify_transaction_error(&err, &batch()), ErrorKind::Other);
    }

    // ==================== classify_message tests ====================

    #[test]
    fn test_classify_message() {
        assert_eq!(
            classify_message("Transfer: insufficient funds for instruction"),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            classify_message("failed to send transaction: custom program error: 0x1"),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            classify_message("custom program error: 0x10"),
            ErrorKind::Other
        );
        assert_eq!(
            classify_message("Transaction simulation failed: Blockhash not found"),
            ErrorKind::SimulationFailed
        );
        assert_eq!(classify_message("User rejected the request."), ErrorKind::UserRejected);
        assert_eq!(classify_message("connection reset"), ErrorKind::Other);
    }

    // ==================== SendError tests ====================

    #[test]
    fn test_user_message_for_rejection() {
        let err = SendError::SubmissionRejected(WalletError::UserRejected);
        assert_eq!(err.kind(), ErrorKind::UserRejected);
        assert_eq!(err.user_message(), "Error: Transaction was rejected by the user.");
        assert_eq!(err.terminal_stage(), SendStage::Rejected);
    }

    #[test]
    fn test_user_message_for_preflight_failures() {
        let err = SendError::SubmissionRejected(WalletError::Preflight(
            TransactionError::InsufficientFundsForFee,
        ));
        assert_eq!(
            err.user_message(),
            "Error: Wallet unable to complete the simulation. Please check your balance."
        );

        let err = SendError::SubmissionRejected(WalletError::Preflight(
            TransactionError::BlockhashNotFound,
        ));
        assert_eq!(
            err.user_message(),
            "Error: Transaction simulation failed. Please try again with different parameters."
        );
    }

    #[test]
    fn test_user_message_for_opaque_wallet_text() {
        let err = SendError::SubmissionRejected(WalletError::Other(
            "User rejected the request.".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::UserRejected);

        let err = SendError::SubmissionRejected(WalletError::Rpc("gateway timeout".to_string()));
        assert_eq!(err.user_message(), "Error: gateway timeout");
    }

    #[test]
    fn test_user_message_for_validation_has_no_prefix() {
        let err = SendError::from(ValidationError::NoTokenSelected);
        assert_eq!(err.user_message(), "Please select a token");
        assert_eq!(err.terminal_stage(), SendStage::Rejected);
    }

    #[test]
    fn test_confirmation_failed_is_verbatim() {
        let signature = Signature::new_unique();
        let err = SendError::ConfirmationFailed {
            signature,
            error: TransactionError::InstructionError(1, InstructionError::Custom(1)),
        };
        assert!(err.user_message().starts_with("Error: Transaction failed to confirm: "));
        assert_eq!(err.signature(), Some(signature));
        assert_eq!(err.terminal_stage(), SendStage::Failed);
    }

    #[test]
    fn test_timeout_points_to_explorer() {
        let signature = Signature::new_unique();
        let err = SendError::ConfirmationTimedOut { signature };
        let msg = err.user_message();
        assert!(msg.contains(&signature.to_string()));
        assert!(msg.contains("explorer"));
        assert_eq!(err.terminal_stage(), SendStage::TimedOut);
    }

    #[test]
    fn test_rpc_transport_error_message() {
        let err = SendError::Rpc(RpcError::Transport("connection refused".to_string()));
        assert_eq!(err.user_message(), "Error: rpc request failed: connection refused");
        assert_eq!(err.terminal_stage(), SendStage::Failed);
        assert_eq!(err.signature(), None);
    }
}
