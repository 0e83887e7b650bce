//! Pre-flight dry run of a built batch.

use crate::builder::TransferBatch;
use crate::error::{classify_transaction_error, ErrorKind, INSUFFICIENT_BALANCE_MESSAGE};
use crate::rpc::{ChainRpc, Freshness, RpcError};
use solana_sdk::transaction::TransactionError;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationFailure {
    #[error("{}", INSUFFICIENT_BALANCE_MESSAGE)]
    InsufficientFunds {
        error: TransactionError,
        logs: Vec<String>,
    },
    /// `payload` is the error as JSON, shown to the user as-is
    #[error("Simulation error: {payload}")]
    Program {
        error: TransactionError,
        payload: String,
        logs: Vec<String>,
    },
    #[error("Error during simulation: {0}")]
    Transport(String),
}

impl SimulationFailure {
    pub fn logs(&self) -> &[String] {
        match self {
            SimulationFailure::InsufficientFunds { logs, .. }
            | SimulationFailure::Program { logs, .. } => logs,
            SimulationFailure::Transport(_) => &[],
        }
    }
}

/// A successful dry run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub freshness: Freshness,
    pub units_consumed: Option<u64>,
    pub logs: Vec<String>,
}

pub struct Simulator<'a> {
    rpc: &'a dyn ChainRpc,
}

impl<'a> Simulator<'a> {
    pub fn new(rpc: &'a dyn ChainRpc) -> Self {
        Self { rpc }
    }

    /// Attach a fresh blockhash and dry-run `batch` without signatures.
    pub async fn simulate(
        &self,
        batch: &TransferBatch,
    ) -> Result<SimulationReport, SimulationFailure> {
        let freshness = self.rpc.get_latest_freshness().await.map_err(transport)?;
        let transaction = batch.to_transaction(freshness.blockhash);

        let outcome = self
            .rpc
            .simulate_transaction(&transaction)
            .await
            .map_err(transport)?;

        match outcome.err {
            None => {
                debug!("Simulation passed, {:?} compute units", outcome.units_consumed);
                Ok(SimulationReport {
                    freshness,
                    units_consumed: outcome.units_consumed,
                    logs: outcome.logs,
                })
            }
            Some(error) => {
                warn!("Simulation failed: {:?}", error);
                for line in &outcome.logs {
                    debug!("  {}", line);
                }
                Err(classify(error, outcome.logs, batch))
            }
        }
    }
}

fn transport(err: RpcError) -> SimulationFailure {
    SimulationFailure::Transport(match err {
        RpcError::Transport(msg) => msg,
        RpcError::Transaction(tx_err) => tx_err.to_string(),
    })
}

fn classify(
    error: TransactionError,
    logs: Vec<String>,
    batch: &TransferBatch,
) -> SimulationFailure {
    match classify_transaction_error(&error, &batch.instructions) {
        ErrorKind::InsufficientFunds => SimulationFailure::InsufficientFunds { error, logs },
        _ => {
            let payload = serde_json::to_string(&error).unwrap_or_else(|_| format!("{:?}", error));
            SimulationFailure::Program { error, payload, logs }
        }
    }
}
