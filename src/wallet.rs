//! Wallet-signing collaborator. The pipeline hands it an unsigned
//! transaction and gets back a signature; keys never leave the wallet.

use crate::rpc::{ChainRpc, RpcError};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::commitment_config::CommitmentLevel;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Options forwarded with every wallet submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: CommitmentLevel,
    /// Bounded rebroadcast count handled by the node
    pub max_retries: usize,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: CommitmentLevel::Confirmed,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("Wallet not connected")]
    NotConnected,
    #[error("User rejected the request.")]
    UserRejected,
    /// Preflight simulation run by the node on submission
    #[error("Transaction simulation failed: {0}")]
    Preflight(TransactionError),
    #[error("{0}")]
    Rpc(String),
    #[error("{0}")]
    Other(String),
}

impl From<RpcError> for WalletError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transaction(tx_err) => WalletError::Preflight(tx_err),
            RpcError::Transport(msg) => WalletError::Rpc(msg),
        }
    }
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Currently connected account, if any.
    fn connected_account(&self) -> Option<Pubkey>;

    /// Sign `transaction` (fee payer and blockhash already set) and submit it.
    async fn send_transaction(
        &self,
        transaction: Transaction,
        options: &SendOptions,
    ) -> Result<Signature, WalletError>;
}

/// Called with the transaction before signing; `false` rejects it.
pub type ApprovalPrompt = Box<dyn Fn(&Transaction) -> bool + Send + Sync>;

/// Signs with a keypair loaded from disk and submits through [`ChainRpc`].
pub struct KeypairWallet {
    keypair: Keypair,
    rpc: Arc<dyn ChainRpc>,
    approval: Option<ApprovalPrompt>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            keypair,
            rpc,
            approval: None,
        }
    }

    /// Load an existing Solana CLI keypair file.
    pub fn from_file(path: &Path, rpc: Arc<dyn ChainRpc>) -> Result<Self> {
        let keypair = read_keypair_file(path)
            .map_err(|e| anyhow!("Failed to read keypair {}: {}", path.display(), e))?;
        Ok(Self::new(keypair, rpc))
    }

    pub fn with_approval(mut self, prompt: ApprovalPrompt) -> Self {
        self.approval = Some(prompt);
        self
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn connected_account(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn send_transaction(
        &self,
        mut transaction: Transaction,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        if let Some(approve) = &self.approval {
            if !approve(&transaction) {
                info!("Transaction declined by signer");
                return Err(WalletError::UserRejected);
            }
        }

        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Other(format!("Signing failed: {}", e)))?;

        Ok(self.rpc.send_transaction(&transaction, options).await?)
    }
}
