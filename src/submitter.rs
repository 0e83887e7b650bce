//! Send pipeline: validate, build, simulate, sign and submit through the
//! wallet, then poll until the signature is final or its blockhash expires.

use crate::builder::{TransactionBuilder, TransferAsset, DEFAULT_COMPUTE_UNIT_LIMIT};
use crate::error::SendError;
use crate::rpc::{ChainRpc, SignatureState};
use crate::simulator::Simulator;
use crate::types::{Recipient, SendStage, SubmissionResult, TokenDescriptor};
use crate::validation;
use crate::wallet::{SendOptions, WalletError, WalletSigner};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Form state captured when a send starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub recipients: Vec<Recipient>,
    pub sending_native: bool,
    pub token: Option<TokenDescriptor>,
}

impl SendRequest {
    pub fn is_token_mode(&self) -> bool {
        !self.sending_native
    }

    fn asset(&self) -> Result<TransferAsset, SendError> {
        if self.sending_native {
            return Ok(TransferAsset::Native);
        }
        match &self.token {
            Some(token) => Ok(TransferAsset::Token(token.clone())),
            None => Err(validation::ValidationError::NoTokenSelected.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Commitment the confirmation poll waits for
    pub commitment: CommitmentConfig,
    pub send_options: SendOptions,
    pub compute_unit_limit: u32,
    pub confirm_poll_interval: Duration,
    /// Consecutive failed status polls before giving up
    pub max_status_poll_errors: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            commitment: CommitmentConfig::confirmed(),
            send_options: SendOptions::default(),
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
            confirm_poll_interval: Duration::from_millis(500),
            max_status_poll_errors: 10,
        }
    }
}

pub struct MultiSender {
    rpc: Arc<dyn ChainRpc>,
    wallet: Arc<dyn WalletSigner>,
    config: SenderConfig,
    submitted: Option<watch::Sender<Option<Signature>>>,
}

impl MultiSender {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn WalletSigner>,
        config: SenderConfig,
    ) -> Self {
        Self {
            rpc,
            wallet,
            config,
            submitted: None,
        }
    }

    /// Publish the signature as soon as the wallet returns it, before
    /// confirmation starts.
    pub fn with_signature_watch(mut self, submitted: watch::Sender<Option<Signature>>) -> Self {
        self.submitted = Some(submitted);
        self
    }

    /// Run one send attempt to completion. Never panics on failure; the
    /// outcome and its status line are in the returned result.
    pub async fn run(
        &self,
        request: &SendRequest,
        stage: &watch::Sender<SendStage>,
    ) -> SubmissionResult {
        match self.execute(request, stage).await {
            Ok(signature) => {
                info!("Transaction confirmed: {}", signature);
                stage.send_replace(SendStage::Confirmed);
                SubmissionResult::confirmed(signature)
            }
            Err(err) => {
                let terminal = err.terminal_stage();
                match terminal {
                    SendStage::Rejected => warn!("Send rejected: {}", err),
                    _ => error!("Send failed: {}", err),
                }
                stage.send_replace(terminal);
                SubmissionResult::failed(
                    terminal,
                    err.signature(),
                    err.user_message(),
                    err.to_string(),
                )
            }
        }
    }

    pub async fn execute(
        &self,
        request: &SendRequest,
        stage: &watch::Sender<SendStage>,
    ) -> Result<Signature, SendError> {
        let sender = self.wallet.connected_account();
        validation::validate(
            sender.as_ref(),
            &request.recipients,
            request.sending_native,
            request.token.as_ref(),
        )?;
        let sender = sender.ok_or(WalletError::NotConnected)?;
        let asset = request.asset()?;

        stage.send_replace(SendStage::Building);
        let batch = TransactionBuilder::new(self.rpc.as_ref())
            .with_compute_unit_limit(self.config.compute_unit_limit)
            .build(&sender, &request.recipients, &asset)
            .await?;

        stage.send_replace(SendStage::Simulating);
        Simulator::new(self.rpc.as_ref()).simulate(&batch).await?;

        stage.send_replace(SendStage::Submitting);
        let freshness = self.rpc.get_latest_freshness().await?;
        let transaction = batch.to_transaction(freshness.blockhash);
        let signature = self
            .wallet
            .send_transaction(transaction, &self.config.send_options)
            .await?;
        info!("Transaction submitted: {}", signature);
        if let Some(submitted) = &self.submitted {
            submitted.send_replace(Some(signature));
        }

        stage.send_replace(SendStage::AwaitingConfirmation);
        self.await_confirmation(signature, freshness.last_valid_block_height)
            .await?;
        Ok(signature)
    }

    /// Poll until `signature` reaches the configured commitment, fails, or
    /// the chain passes `last_valid_block_height`. Status and block height
    /// failures are capped separately by `max_status_poll_errors`
    /// consecutive errors.
    pub async fn await_confirmation(
        &self,
        signature: Signature,
        last_valid_block_height: u64,
    ) -> Result<(), SendError> {
        let commitment = self.config.commitment;
        let max_errors = self.config.max_status_poll_errors;
        let mut poll_errors = 0u32;
        let mut height_errors = 0u32;

        loop {
            match self.rpc.get_signature_state(&signature, commitment).await {
                Ok(SignatureState::Confirmed) => return Ok(()),
                Ok(SignatureState::Failed(error)) => {
                    return Err(SendError::ConfirmationFailed { signature, error });
                }
                Ok(SignatureState::Pending) => poll_errors = 0,
                Err(e) => {
                    poll_errors += 1;
                    warn!("Status poll {} for {} failed: {}", poll_errors, signature, e);
                    if poll_errors >= max_errors {
                        return Err(SendError::ConfirmationTimedOut { signature });
                    }
                }
            }

            match self.rpc.get_block_height().await {
                Ok(height) if height > last_valid_block_height => {
                    // The transaction may have landed between the two queries
                    return match self.rpc.get_signature_state(&signature, commitment).await {
                        Ok(SignatureState::Confirmed) => Ok(()),
                        Ok(SignatureState::Failed(error)) => {
                            Err(SendError::ConfirmationFailed { signature, error })
                        }
                        _ => {
                            warn!(
                                "Blockhash for {} expired at height {} (last valid {})",
                                signature, height, last_valid_block_height
                            );
                            Err(SendError::ConfirmationTimedOut { signature })
                        }
                    };
                }
                Ok(_) => height_errors = 0,
                Err(e) => {
                    height_errors += 1;
                    warn!("Block height query {} failed: {}", height_errors, e);
                    // Expiry can no longer be observed
                    if height_errors >= max_errors {
                        return Err(SendError::ConfirmationTimedOut { signature });
                    }
                }
            }

            sleep(self.config.confirm_poll_interval).await;
        }
    }
}
