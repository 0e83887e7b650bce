//! Balance lookups for the connected account and the background watcher that
//! keeps them current.

use crate::rpc::{ChainRpc, RpcError};
use crate::types::{BalanceSnapshot, TokenAmount, TokenDescriptor};
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use spl_token::state::Account as TokenAccount;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

pub const NATIVE_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const TOKEN_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub async fn fetch_native_balance(
    rpc: &dyn ChainRpc,
    owner: &Pubkey,
) -> Result<TokenAmount, RpcError> {
    let lamports = rpc.get_balance(owner).await?;
    Ok(TokenAmount::lamports(lamports))
}

/// Balance of `owner`'s associated token account for `token`. A missing
/// account is a zero balance.
pub async fn fetch_token_balance(
    rpc: &dyn ChainRpc,
    owner: &Pubkey,
    token: &TokenDescriptor,
) -> Result<TokenAmount, RpcError> {
    let mint = token
        .mint()
        .map_err(|e| RpcError::Transport(format!("invalid mint {}: {}", token.address, e)))?;
    let ata = get_associated_token_address(owner, &mint);

    let raw = match rpc.get_account(&ata).await? {
        Some(account) => TokenAccount::unpack(&account.data)
            .map(|state| state.amount)
            .map_err(|e| RpcError::Transport(format!("undecodable token account {}: {}", ata, e)))?,
        None => 0,
    };
    Ok(TokenAmount::new(raw, token.decimals))
}

/// Snapshot for every non-native token. Failures read as zero so one bad
/// token never hides the others.
pub async fn fetch_token_balances(
    rpc: &dyn ChainRpc,
    owner: &Pubkey,
    tokens: &[TokenDescriptor],
) -> BalanceSnapshot {
    let mut snapshot = BalanceSnapshot::new();
    for token in tokens.iter().filter(|t| !t.is_native()) {
        let amount = match fetch_token_balance(rpc, owner, token).await {
            Ok(amount) => amount,
            Err(e) => {
                warn!("Failed to fetch {} balance: {}", token.symbol, e);
                TokenAmount::zero(token.decimals)
            }
        };
        snapshot.insert(token.address.clone(), amount);
    }
    snapshot
}

/// Two periodic pollers (native and token balances) for one account. The
/// tasks are aborted when the watcher is stopped or dropped.
pub struct BalanceWatcher {
    owner: Pubkey,
    native: watch::Receiver<TokenAmount>,
    tokens: watch::Receiver<BalanceSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl BalanceWatcher {
    /// Must be called from within a tokio runtime.
    pub fn start(
        rpc: Arc<dyn ChainRpc>,
        owner: Pubkey,
        tokens: Vec<TokenDescriptor>,
        native_interval: Duration,
        token_interval: Duration,
    ) -> Self {
        let (native_tx, native_rx) = watch::channel(TokenAmount::lamports(0));
        let (tokens_tx, tokens_rx) = watch::channel(BalanceSnapshot::new());

        let native_rpc = rpc.clone();
        let native_task = tokio::spawn(async move {
            let mut ticker = interval(native_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match fetch_native_balance(native_rpc.as_ref(), &owner).await {
                    Ok(amount) => {
                        debug!("SOL balance for {}: {}", owner, amount);
                        native_tx.send_replace(amount);
                    }
                    // Keep the previous value
                    Err(e) => warn!("Failed to fetch SOL balance for {}: {}", owner, e),
                }
            }
        });

        let token_task = tokio::spawn(async move {
            let mut ticker = interval(token_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = fetch_token_balances(rpc.as_ref(), &owner, &tokens).await;
                tokens_tx.send_replace(snapshot);
            }
        });

        Self {
            owner,
            native: native_rx,
            tokens: tokens_rx,
            tasks: vec![native_task, token_task],
        }
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn native(&self) -> TokenAmount {
        *self.native.borrow()
    }

    pub fn tokens(&self) -> BalanceSnapshot {
        self.tokens.borrow().clone()
    }

    pub fn token(&self, mint: &str) -> Option<TokenAmount> {
        self.tokens.borrow().get(mint).copied()
    }

    pub fn subscribe_native(&self) -> watch::Receiver<TokenAmount> {
        self.native.clone()
    }

    pub fn subscribe_tokens(&self) -> watch::Receiver<BalanceSnapshot> {
        self.tokens.clone()
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for BalanceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
