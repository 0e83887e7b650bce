//! Front-end state for one connected user: form contents, token selection,
//! status line, balances and the single in-flight send.

use crate::async_job::AsyncJob;
use crate::balance::BalanceWatcher;
use crate::config::Config;
use crate::error::SendError;
use crate::recipients::RecipientList;
use crate::rpc::ChainRpc;
use crate::submitter::{MultiSender, SendRequest};
use crate::token_registry::{RegistryError, TokenRegistry};
use crate::types::{SendStage, SubmissionResult, TokenAmount, TokenDescriptor};
use crate::validation;
use crate::wallet::WalletSigner;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

struct SendJob {
    job: AsyncJob<SubmissionResult>,
    stage: watch::Receiver<SendStage>,
    submitted: watch::Receiver<Option<Signature>>,
    token_mode: bool,
}

impl SendJob {
    fn submitted(&self) -> Option<Signature> {
        *self.submitted.borrow()
    }
}

pub struct MultiSendSession {
    config: Config,
    rpc: Arc<dyn ChainRpc>,
    wallet: Arc<dyn WalletSigner>,
    recipients: RecipientList,
    registry: TokenRegistry,
    selected_token: Option<TokenDescriptor>,
    sending_native: bool,
    status: String,
    signature: Option<Signature>,
    last_result: Option<SubmissionResult>,
    watcher: Option<BalanceWatcher>,
    send_job: Option<SendJob>,
}

impl MultiSendSession {
    pub fn new(config: Config, rpc: Arc<dyn ChainRpc>, wallet: Arc<dyn WalletSigner>) -> Self {
        Self::with_registry(config, rpc, wallet, TokenRegistry::devnet())
    }

    pub fn with_registry(
        config: Config,
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn WalletSigner>,
        registry: TokenRegistry,
    ) -> Self {
        let selected_token = registry.native().cloned();
        Self {
            config,
            rpc,
            wallet,
            recipients: RecipientList::default(),
            registry,
            selected_token,
            sending_native: true,
            status: String::new(),
            signature: None,
            last_result: None,
            watcher: None,
            send_job: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn recipients(&self) -> &RecipientList {
        &self.recipients
    }

    pub fn recipients_mut(&mut self) -> &mut RecipientList {
        &mut self.recipients
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn selected_token(&self) -> Option<&TokenDescriptor> {
        self.selected_token.as_ref()
    }

    pub fn is_sending_native(&self) -> bool {
        self.sending_native
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }

    pub fn last_result(&self) -> Option<&SubmissionResult> {
        self.last_result.as_ref()
    }

    pub fn watcher(&self) -> Option<&BalanceWatcher> {
        self.watcher.as_ref()
    }

    pub fn is_sending(&self) -> bool {
        self.send_job.is_some()
    }

    /// The wrapped-SOL descriptor switches to native mode; anything else to
    /// token mode.
    pub fn select_token(&mut self, token: TokenDescriptor) {
        self.sending_native = token.is_native();
        debug!("Selected {} (native: {})", token.symbol, self.sending_native);
        self.selected_token = Some(token);
    }

    /// Select a registry entry by mint address.
    pub fn select_token_address(&mut self, address: &str) -> bool {
        match self.registry.find(address).cloned() {
            Some(token) => {
                self.select_token(token);
                true
            }
            None => false,
        }
    }

    /// Look up, register and select a custom mint. The status line reflects
    /// the outcome.
    pub async fn add_custom_token(
        &mut self,
        address: &str,
    ) -> Result<TokenDescriptor, RegistryError> {
        match self.registry.add_custom(address, self.rpc.as_ref()).await {
            Ok(token) => {
                self.status = format!("Added {}", token.name);
                self.select_token(token.clone());
                self.restart_watcher();
                Ok(token)
            }
            Err(e) => {
                self.status = e.to_string();
                Err(e)
            }
        }
    }

    /// Restart balance polling when the wallet's account changed. Returns
    /// true when it did.
    pub fn sync_wallet(&mut self) -> bool {
        let current = self.wallet.connected_account();
        let watched = self.watcher.as_ref().map(BalanceWatcher::owner);
        if current == watched {
            return false;
        }
        info!("Wallet account changed: {:?} -> {:?}", watched, current);
        self.restart_watcher();
        true
    }

    fn restart_watcher(&mut self) {
        // Dropping the old watcher aborts its tasks
        self.watcher = self.wallet.connected_account().map(|owner: Pubkey| {
            BalanceWatcher::start(
                self.rpc.clone(),
                owner,
                self.registry.all(),
                self.config.native_poll_interval,
                self.config.token_poll_interval,
            )
        });
    }

    fn request(&self) -> SendRequest {
        SendRequest {
            recipients: self.recipients.entries().to_vec(),
            sending_native: self.sending_native,
            token: if self.sending_native {
                None
            } else {
                self.selected_token.clone()
            },
        }
    }

    /// Validate and spawn the send pipeline. Returns immediately; drive the
    /// rest with [`poll`](Self::poll).
    pub fn start_send(&mut self) -> Result<(), SendError> {
        if self.send_job.is_some() {
            return Err(SendError::SendInProgress);
        }

        self.signature = None;
        let request = self.request();
        let account = self.wallet.connected_account();
        if let Err(e) = validation::validate(
            account.as_ref(),
            &request.recipients,
            request.sending_native,
            request.token.as_ref(),
        ) {
            self.status = e.to_string();
            return Err(e.into());
        }

        let token_mode = request.is_token_mode();
        let (stage_tx, stage_rx) = watch::channel(SendStage::Building);
        let (submitted_tx, submitted_rx) = watch::channel(None);
        let sender = MultiSender::new(
            self.rpc.clone(),
            self.wallet.clone(),
            self.config.sender_config(),
        )
        .with_signature_watch(submitted_tx);
        let job = AsyncJob::spawn(async move { Ok(sender.run(&request, &stage_tx).await) });

        self.status = SendStage::Building
            .progress_text(token_mode)
            .unwrap_or_default()
            .to_string();
        self.send_job = Some(SendJob {
            job,
            stage: stage_rx,
            submitted: submitted_rx,
            token_mode,
        });
        Ok(())
    }

    /// Non-blocking. Mirrors the pipeline stage and the submitted signature
    /// into the session and returns the result once the send finishes.
    pub fn poll(&mut self) -> Option<SubmissionResult> {
        let send_job = self.send_job.as_mut()?;

        if let Some(text) = send_job.stage.borrow().progress_text(send_job.token_mode) {
            self.status = text.to_string();
        }
        if let Some(signature) = send_job.submitted() {
            self.signature = Some(signature);
        }

        let outcome = send_job.job.poll()?;
        Some(self.finish(outcome))
    }

    /// Start a send and wait for it to finish. If the returned future is
    /// dropped the send keeps running and [`poll`](Self::poll) picks it up.
    pub async fn send(&mut self) -> Result<SubmissionResult, SendError> {
        self.start_send()?;
        let outcome = match self.send_job.as_mut() {
            Some(send_job) => send_job.job.wait().await,
            None => return Err(SendError::SendInProgress),
        };
        Ok(self.finish(outcome))
    }

    fn finish(&mut self, outcome: anyhow::Result<SubmissionResult>) -> SubmissionResult {
        // Sending is re-enabled whatever happened
        let submitted = self.send_job.take().and_then(|job| job.submitted());

        let result = outcome.unwrap_or_else(|e| {
            SubmissionResult::failed(
                SendStage::Failed,
                submitted,
                format!("Error: {}", e),
                e.to_string(),
            )
        });
        self.status = result.status.clone();
        self.signature = result.signature.or(submitted);
        if result.signature.is_some() {
            self.restart_watcher();
        }
        self.last_result = Some(result.clone());
        result
    }

    pub fn current_symbol(&self) -> &str {
        if self.sending_native {
            "SOL"
        } else {
            self.selected_token.as_ref().map(|t| t.symbol.as_str()).unwrap_or("")
        }
    }

    /// Balance of the selected asset, once the watcher has a value.
    pub fn current_balance(&self) -> Option<TokenAmount> {
        let watcher = self.watcher.as_ref()?;
        if self.sending_native {
            Some(watcher.native())
        } else {
            let token = self.selected_token.as_ref()?;
            Some(
                watcher
                    .token(&token.address)
                    .unwrap_or(TokenAmount::zero(token.decimals)),
            )
        }
    }

    pub fn send_label(&self) -> String {
        format!("Send {}", self.current_symbol())
    }

    pub fn explorer_url(&self) -> Option<String> {
        let signature = self.signature?.to_string();
        self.config.tx_explorer_url(&signature)
    }

    pub fn solscan_url(&self) -> Option<String> {
        let signature = self.signature?.to_string();
        self.config.solscan_url(&signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SignatureState;
    use crate::testing::{MockRpc, MockWallet};
    use crate::types::RecipientField;
    use crate::wallet::WalletError;
    use spl_associated_token_account::get_associated_token_address;
    use std::time::Duration;
    use tokio::time::timeout;

    fn fast_config() -> Config {
        let mut config = Config::new(crate::config::Cluster::Devnet);
        config.confirm_poll_interval = Duration::from_millis(1);
        config.native_poll_interval = Duration::from_millis(10);
        config.token_poll_interval = Duration::from_millis(10);
        config
    }

    fn session_with(wallet: Arc<MockWallet>) -> (Arc<MockRpc>, MultiSendSession) {
        let rpc = Arc::new(MockRpc::new());
        let session = MultiSendSession::new(fast_config(), rpc.clone(), wallet);
        (rpc, session)
    }

    fn fill_one(session: &mut MultiSendSession, amount: &str) -> Pubkey {
        let recipient = Pubkey::new_unique();
        let list = session.recipients_mut();
        list.update(0, RecipientField::Address, recipient.to_string());
        list.update(0, RecipientField::Amount, amount);
        recipient
    }

    // ==================== Selection tests ====================

    #[test]
    fn test_defaults_to_native() {
        let (_rpc, session) = session_with(Arc::new(MockWallet::disconnected()));
        assert!(session.is_sending_native());
        assert_eq!(session.send_label(), "Send SOL");
        assert_eq!(session.selected_token().unwrap().symbol, "SOL");
        assert!(session.current_balance().is_none());
    }

    #[test]
    fn test_select_token_switches_mode() {
        let (_rpc, mut session) = session_with(Arc::new(MockWallet::disconnected()));
        assert!(session.select_token_address("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"));
        assert!(!session.is_sending_native());
        assert_eq!(session.send_label(), "Send USDC");

        let sol = session.registry().native().cloned().unwrap();
        session.select_token(sol);
        assert!(session.is_sending_native());
        assert!(!session.select_token_address("unknown"));
    }

    #[tokio::test]
    async fn test_add_custom_token_selects_it() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (rpc, mut session) = session_with(wallet);
        let mint = Pubkey::new_unique();
        rpc.insert_mint(mint, 9);

        let token = session.add_custom_token(&mint.to_string()).await.unwrap();

        assert!(!session.is_sending_native());
        assert_eq!(session.selected_token(), Some(&token));
        assert_eq!(session.send_label(), format!("Send {}", token.symbol));
        assert!(session.watcher().is_some());
    }

    #[tokio::test]
    async fn test_failed_custom_token_keeps_selection() {
        let (_rpc, mut session) = session_with(Arc::new(MockWallet::disconnected()));

        assert!(session.add_custom_token("not-a-mint").await.is_err());

        assert!(session.is_sending_native());
        assert_eq!(session.send_label(), "Send SOL");
    }

    // ==================== Send tests ====================

    #[tokio::test]
    async fn test_send_native_end_to_end() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (_rpc, mut session) = session_with(wallet.clone());
        fill_one(&mut session, "1.5");

        let result = session.send().await.unwrap();

        assert!(result.is_confirmed());
        assert_eq!(session.status(), "Transaction confirmed!");
        assert_eq!(session.signature(), result.signature);
        assert!(!session.is_sending());
        assert_eq!(wallet.sent().len(), 1);
        let url = session.explorer_url().unwrap();
        assert!(url.ends_with("?cluster=devnet"));
        assert!(session.solscan_url().unwrap().starts_with("https://solscan.io/tx/"));
        // Balance polling restarts after a signature
        assert!(session.watcher().is_some());
    }

    #[tokio::test]
    async fn test_start_send_rejects_reentry() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (_rpc, mut session) = session_with(wallet.clone());
        fill_one(&mut session, "1");

        session.start_send().unwrap();
        assert!(session.is_sending());
        assert_eq!(session.status(), "Creating transaction...");
        assert!(matches!(session.start_send(), Err(SendError::SendInProgress)));

        let result = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(result) = session.poll() {
                    break result;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(result.is_confirmed());
        assert!(!session.is_sending());
        assert_eq!(wallet.sent().len(), 1);
        // Sending is available again
        session.start_send().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_send_can_still_be_polled() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (rpc, mut session) = session_with(wallet);
        let mut states = vec![SignatureState::Pending; 100];
        states.push(SignatureState::Confirmed);
        rpc.script_signature_states(states);
        fill_one(&mut session, "1");

        assert!(timeout(Duration::from_millis(5), session.send()).await.is_err());
        assert!(session.is_sending());

        let result = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(result) = session.poll() {
                    break result;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(result.is_confirmed());
        assert!(!session.is_sending());
        session.start_send().unwrap();
    }

    #[tokio::test]
    async fn test_signature_available_while_confirming() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (rpc, mut session) = session_with(wallet);
        rpc.script_signature_states(vec![SignatureState::Pending]);
        fill_one(&mut session, "1");

        session.start_send().unwrap();
        let signature = timeout(Duration::from_secs(5), async {
            loop {
                session.poll();
                if let Some(signature) = session.signature() {
                    break signature;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(session.is_sending());
        assert!(session.explorer_url().unwrap().contains(&signature.to_string()));

        rpc.script_signature_states(vec![SignatureState::Confirmed]);
        let result = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(result) = session.poll() {
                    break result;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(result.is_confirmed());
        assert_eq!(result.signature, Some(signature));
        assert_eq!(session.signature(), Some(signature));
    }

    #[tokio::test]
    async fn test_validation_error_sets_status_without_spawning() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (rpc, mut session) = session_with(wallet);

        let err = session.start_send().unwrap_err();

        assert!(matches!(err, SendError::InputInvalid(_)));
        assert_eq!(session.status(), "Please fill in all recipient addresses and amounts");
        assert!(!session.is_sending());
        assert_eq!(rpc.freshness_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_send_reenables_and_keeps_no_signature() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        wallet.fail_with(WalletError::UserRejected);
        let (_rpc, mut session) = session_with(wallet);
        fill_one(&mut session, "0.1");

        let result = session.send().await.unwrap();

        assert_eq!(result.stage, SendStage::Rejected);
        assert_eq!(session.status(), "Error: Transaction was rejected by the user.");
        assert!(session.signature().is_none());
        assert!(session.explorer_url().is_none());
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_token_send_end_to_end() {
        let owner = Pubkey::new_unique();
        let wallet = Arc::new(MockWallet::connected(owner));
        let (rpc, mut session) = session_with(wallet.clone());
        let mint = Pubkey::new_unique();
        rpc.insert_mint(mint, 6);

        let token = session.add_custom_token(&mint.to_string()).await.unwrap();
        assert_eq!(session.status(), format!("Added {}", token.name));
        let recipient = fill_one(&mut session, "2.5");

        let result = session.send().await.unwrap();

        assert!(result.is_confirmed());
        let (tx, _) = &wallet.sent()[0];
        assert_eq!(tx.message.instructions.len(), 3);
        assert!(tx
            .message
            .account_keys
            .contains(&get_associated_token_address(&recipient, &mint)));
    }

    // ==================== Balance tests ====================

    #[tokio::test]
    async fn test_sync_wallet_follows_account() {
        let first = Pubkey::new_unique();
        let wallet = Arc::new(MockWallet::connected(first));
        let (rpc, mut session) = session_with(wallet.clone());
        rpc.set_balance(first, 3_000_000_000);

        assert!(session.sync_wallet());
        assert!(!session.sync_wallet());
        let mut native = session.watcher().unwrap().subscribe_native();
        timeout(Duration::from_secs(2), native.changed()).await.unwrap().unwrap();
        assert_eq!(session.current_balance(), Some(TokenAmount::lamports(3_000_000_000)));

        let second = Pubkey::new_unique();
        wallet.switch_account(Some(second));
        assert!(session.sync_wallet());
        assert_eq!(session.watcher().unwrap().owner(), second);

        wallet.switch_account(None);
        assert!(session.sync_wallet());
        assert!(session.watcher().is_none());
    }

    #[tokio::test]
    async fn test_current_balance_for_token_defaults_to_zero() {
        let wallet = Arc::new(MockWallet::connected(Pubkey::new_unique()));
        let (_rpc, mut session) = session_with(wallet);
        session.sync_wallet();
        session.select_token_address("BLwTnYKqf7u4qjgZrrsKeNs2EzWkMLqVCu6j8iHyrNA3");
        assert_eq!(session.current_balance(), Some(TokenAmount::zero(8)));
        assert_eq!(session.current_symbol(), "BTC");
    }
}
