//! RPC collaborator: the chain queries the send pipeline needs, behind a
//! trait so the pipeline can run against a mock in tests.

use crate::wallet::SendOptions;
use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use thiserror::Error;
use tracing::debug;

/// Recent blockhash plus the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationOutcome {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Status of a submitted signature at the requested commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Unknown to the node, or not yet at the requested commitment
    Pending,
    Confirmed,
    Failed(TransactionError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// The node rejected the transaction itself (e.g. preflight failure)
    #[error("transaction rejected: {0}")]
    Transaction(TransactionError),
    #[error("rpc request failed: {0}")]
    Transport(String),
}

impl From<ClientError> for RpcError {
    fn from(err: ClientError) -> Self {
        match err.get_transaction_error() {
            Some(tx_err) => RpcError::Transaction(tx_err),
            None => RpcError::Transport(err.to_string()),
        }
    }
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Lamport balance of `account`.
    async fn get_balance(&self, account: &Pubkey) -> Result<u64, RpcError>;

    /// Account data, or `None` when the account does not exist.
    async fn get_account(&self, account: &Pubkey) -> Result<Option<Account>, RpcError>;

    async fn account_exists(&self, account: &Pubkey) -> Result<bool, RpcError> {
        Ok(self.get_account(account).await?.is_some())
    }

    async fn get_latest_freshness(&self) -> Result<Freshness, RpcError>;

    async fn get_block_height(&self) -> Result<u64, RpcError>;

    /// Dry-run an unsigned transaction.
    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulationOutcome, RpcError>;

    /// Broadcast a signed transaction.
    async fn send_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature, RpcError>;

    async fn get_signature_state(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureState, RpcError>;
}

/// [`ChainRpc`] over a Solana JSON-RPC endpoint.
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.into(), commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn get_balance(&self, account: &Pubkey) -> Result<u64, RpcError> {
        let response = self
            .client
            .get_balance_with_commitment(account, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn get_account(&self, account: &Pubkey) -> Result<Option<Account>, RpcError> {
        let response = self
            .client
            .get_account_with_commitment(account, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn get_latest_freshness(&self) -> Result<Freshness, RpcError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;
        debug!("Latest blockhash {} valid until height {}", blockhash, last_valid_block_height);
        Ok(Freshness {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, RpcError> {
        Ok(self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await?)
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulationOutcome, RpcError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await?;
        Ok(SimulationOutcome {
            err: response.value.err,
            logs: response.value.logs.unwrap_or_default(),
            units_consumed: response.value.units_consumed,
        })
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_commitment),
            max_retries: Some(options.max_retries),
            ..Default::default()
        };
        Ok(self
            .client
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn get_signature_state(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureState, RpcError> {
        let statuses = self.client.get_signature_statuses(&[*signature]).await?.value;
        let state = match statuses.into_iter().next().flatten() {
            None => SignatureState::Pending,
            Some(status) => {
                let reached = status.satisfies_commitment(commitment);
                match status.err {
                    Some(err) => SignatureState::Failed(err),
                    None if reached => SignatureState::Confirmed,
                    None => SignatureState::Pending,
                }
            }
        };
        Ok(state)
    }
}
