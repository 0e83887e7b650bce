//! In-memory collaborators for unit tests.

use crate::rpc::{ChainRpc, Freshness, RpcError, SignatureState, SimulationOutcome};
use crate::wallet::{SendOptions, WalletError, WalletSigner};
use async_trait::async_trait;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::program_option::COption;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use spl_token::state::{Account as TokenAccount, AccountState, Mint};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockRpcState {
    balances: HashMap<Pubkey, u64>,
    accounts: HashMap<Pubkey, Account>,
    balance_error: Option<String>,
    simulation_error: Option<TransactionError>,
    simulation_transport_error: Option<String>,
    send_error: Option<RpcError>,
    signature_states: VecDeque<SignatureState>,
    status_error: Option<String>,
    block_height_error: Option<String>,
    block_height: u64,
    block_height_step: u64,
    last_valid_block_height: u64,
    balance_calls: usize,
    account_calls: usize,
    freshness_calls: usize,
    simulated: Vec<Transaction>,
    sent: Vec<Transaction>,
}

/// Scriptable [`ChainRpc`]. Signature polls pop `signature_states` in order
/// and repeat the last one; with nothing scripted they report `Confirmed`.
pub struct MockRpc {
    state: Mutex<MockRpcState>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockRpcState {
                block_height: 100,
                last_valid_block_height: 250,
                ..Default::default()
            }),
        }
    }

    pub fn set_balance(&self, account: Pubkey, lamports: u64) {
        self.state.lock().unwrap().balances.insert(account, lamports);
    }

    pub fn fail_balances(&self, message: &str) {
        self.state.lock().unwrap().balance_error = Some(message.to_string());
    }

    pub fn insert_account(&self, address: Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(address, account);
    }

    pub fn insert_mint(&self, mint: Pubkey, decimals: u8) {
        let mut data = vec![0u8; Mint::LEN];
        let state = Mint {
            mint_authority: COption::None,
            supply: 1_000_000_000_000,
            decimals,
            is_initialized: true,
            freeze_authority: COption::None,
        };
        Mint::pack(state, &mut data).unwrap();
        self.insert_account(mint, Self::token_program_account(data));
    }

    pub fn insert_token_account(&self, address: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) {
        let mut data = vec![0u8; TokenAccount::LEN];
        let state = TokenAccount {
            mint,
            owner,
            amount,
            delegate: COption::None,
            state: AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        TokenAccount::pack(state, &mut data).unwrap();
        self.insert_account(address, Self::token_program_account(data));
    }

    fn token_program_account(data: Vec<u8>) -> Account {
        Account {
            lamports: 2_039_280,
            data,
            owner: spl_token::id(),
            executable: false,
            rent_epoch: 0,
        }
    }

    pub fn fail_simulation(&self, error: TransactionError) {
        self.state.lock().unwrap().simulation_error = Some(error);
    }

    pub fn fail_simulation_transport(&self, message: &str) {
        self.state.lock().unwrap().simulation_transport_error = Some(message.to_string());
    }

    pub fn fail_send(&self, error: RpcError) {
        self.state.lock().unwrap().send_error = Some(error);
    }

    pub fn script_signature_states(&self, states: Vec<SignatureState>) {
        self.state.lock().unwrap().signature_states = states.into();
    }

    pub fn fail_status_polls(&self, message: &str) {
        self.state.lock().unwrap().status_error = Some(message.to_string());
    }

    pub fn fail_block_heights(&self, message: &str) {
        self.state.lock().unwrap().block_height_error = Some(message.to_string());
    }

    /// Current height, how much it grows per query, and the expiry height.
    pub fn set_block_heights(&self, current: u64, step: u64, last_valid: u64) {
        let mut state = self.state.lock().unwrap();
        state.block_height = current;
        state.block_height_step = step;
        state.last_valid_block_height = last_valid;
    }

    pub fn balance_calls(&self) -> usize {
        self.state.lock().unwrap().balance_calls
    }

    pub fn account_calls(&self) -> usize {
        self.state.lock().unwrap().account_calls
    }

    pub fn freshness_calls(&self) -> usize {
        self.state.lock().unwrap().freshness_calls
    }

    pub fn simulated_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().simulated.clone()
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn get_balance(&self, account: &Pubkey) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.balance_calls += 1;
        if let Some(msg) = &state.balance_error {
            return Err(RpcError::Transport(msg.clone()));
        }
        Ok(state.balances.get(account).copied().unwrap_or(0))
    }

    async fn get_account(&self, account: &Pubkey) -> Result<Option<Account>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.account_calls += 1;
        Ok(state.accounts.get(account).cloned())
    }

    async fn get_latest_freshness(&self) -> Result<Freshness, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.freshness_calls += 1;
        Ok(Freshness {
            blockhash: Hash::new_unique(),
            last_valid_block_height: state.last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = &state.block_height_error {
            return Err(RpcError::Transport(msg.clone()));
        }
        let height = state.block_height;
        state.block_height += state.block_height_step;
        Ok(height)
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulationOutcome, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.simulated.push(transaction.clone());
        if let Some(msg) = &state.simulation_transport_error {
            return Err(RpcError::Transport(msg.clone()));
        }
        Ok(SimulationOutcome {
            err: state.simulation_error.clone(),
            logs: vec!["Program 11111111111111111111111111111111 invoke [1]".to_string()],
            units_consumed: Some(450),
        })
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        _options: &SendOptions,
    ) -> Result<Signature, RpcError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }
        state.sent.push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn get_signature_state(
        &self,
        _signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<SignatureState, RpcError> {
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = &state.status_error {
            return Err(RpcError::Transport(msg.clone()));
        }
        let next = if state.signature_states.len() > 1 {
            state.signature_states.pop_front()
        } else {
            state.signature_states.front().cloned()
        };
        Ok(next.unwrap_or(SignatureState::Confirmed))
    }
}

/// Wallet stub that records what it was asked to send.
pub struct MockWallet {
    account: Mutex<Option<Pubkey>>,
    error: Mutex<Option<WalletError>>,
    sent: Mutex<Vec<(Transaction, SendOptions)>>,
}

impl MockWallet {
    pub fn connected(account: Pubkey) -> Self {
        Self {
            account: Mutex::new(Some(account)),
            error: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: Mutex::new(None),
            error: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn switch_account(&self, account: Option<Pubkey>) {
        *self.account.lock().unwrap() = account;
    }

    pub fn fail_with(&self, error: WalletError) {
        *self.error.lock().unwrap() = Some(error);
    }

    pub fn sent(&self) -> Vec<(Transaction, SendOptions)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn connected_account(&self) -> Option<Pubkey> {
        *self.account.lock().unwrap()
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        self.sent.lock().unwrap().push((transaction, *options));
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Signature::new_unique())
    }
}
