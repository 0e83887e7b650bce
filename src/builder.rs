//! Turns a validated recipient list into the ordered instruction batch.

use crate::error::SendError;
use crate::rpc::ChainRpc;
use crate::types::{Recipient, TokenAmount, TokenDescriptor};
use crate::utils::{self, AmountError};
use crate::validation::{self, ValidationError};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use std::collections::HashSet;
use tracing::{debug, info};

pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 1_000_000;

/// What is being sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAsset {
    Native,
    Token(TokenDescriptor),
}

impl TransferAsset {
    pub fn decimals(&self) -> u8 {
        match self {
            TransferAsset::Native => utils::SOL_DECIMALS,
            TransferAsset::Token(token) => token.decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            TransferAsset::Native => "SOL",
            TransferAsset::Token(token) => &token.symbol,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, TransferAsset::Token(_))
    }
}

/// One recipient's share of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    /// Wallet that receives the funds
    pub recipient: Pubkey,
    /// Account credited: the wallet itself, or its associated token account
    pub destination: Pubkey,
    pub amount: u64,
    pub creates_account: bool,
}

/// Instruction batch for one send attempt. Built fresh every time.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferBatch {
    pub fee_payer: Pubkey,
    pub instructions: Vec<Instruction>,
    pub asset: TransferAsset,
    pub transfers: Vec<PlannedTransfer>,
}

impl TransferBatch {
    pub fn created_accounts(&self) -> usize {
        self.transfers.iter().filter(|t| t.creates_account).count()
    }

    pub fn total_amount(&self) -> TokenAmount {
        let raw = self
            .transfers
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.amount));
        TokenAmount::new(raw, self.asset.decimals())
    }

    /// Unsigned transaction with the fee payer and `blockhash` attached.
    pub fn to_transaction(&self, blockhash: Hash) -> Transaction {
        let message =
            Message::new_with_blockhash(&self.instructions, Some(&self.fee_payer), &blockhash);
        Transaction::new_unsigned(message)
    }
}

pub struct TransactionBuilder<'a> {
    rpc: &'a dyn ChainRpc,
    compute_unit_limit: u32,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(rpc: &'a dyn ChainRpc) -> Self {
        Self {
            rpc,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
        }
    }

    pub fn with_compute_unit_limit(mut self, limit: u32) -> Self {
        self.compute_unit_limit = limit;
        self
    }

    /// Build the batch for `recipients`. Every amount is converted before any
    /// network call, so a bad row fails without touching the RPC.
    pub async fn build(
        &self,
        sender: &Pubkey,
        recipients: &[Recipient],
        asset: &TransferAsset,
    ) -> Result<TransferBatch, SendError> {
        let decimals = asset.decimals();
        let mut parsed = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let owner = validation::parse_address(&recipient.address)?;
            let amount = convert_amount(&recipient.amount, decimals, asset.symbol())?;
            parsed.push((owner, amount));
        }

        let mut instructions = vec![ComputeBudgetInstruction::set_compute_unit_limit(
            self.compute_unit_limit,
        )];
        let mut transfers = Vec::with_capacity(parsed.len());

        match asset {
            TransferAsset::Native => {
                for (owner, amount) in parsed {
                    instructions.push(system_instruction::transfer(sender, &owner, amount));
                    transfers.push(PlannedTransfer {
                        recipient: owner,
                        destination: owner,
                        amount,
                        creates_account: false,
                    });
                }
            }
            TransferAsset::Token(token) => {
                let mint = validation::parse_address(&token.address)?;
                let source = get_associated_token_address(sender, &mint);
                let mut created = HashSet::new();

                for (owner, amount) in parsed {
                    let destination = get_associated_token_address(&owner, &mint);
                    let creates_account = !created.contains(&destination)
                        && !self.rpc.account_exists(&destination).await?;
                    if creates_account {
                        debug!("Creating token account {} for {}", destination, owner);
                        instructions.push(create_associated_token_account(
                            sender,
                            &owner,
                            &mint,
                            &spl_token::id(),
                        ));
                        created.insert(destination);
                    }

                    instructions.push(spl_token::instruction::transfer(
                        &spl_token::id(),
                        &source,
                        &destination,
                        sender,
                        &[],
                        amount,
                    )?);
                    transfers.push(PlannedTransfer {
                        recipient: owner,
                        destination,
                        amount,
                        creates_account,
                    });
                }
            }
        }

        let batch = TransferBatch {
            fee_payer: *sender,
            instructions,
            asset: asset.clone(),
            transfers,
        };
        info!(
            "Built batch: {} instructions, {} recipients, {} new token accounts, total {} {}",
            batch.instructions.len(),
            batch.transfers.len(),
            batch.created_accounts(),
            batch.total_amount().display_short(),
            asset.symbol()
        );
        Ok(batch)
    }
}

fn convert_amount(amount: &str, decimals: u8, symbol: &str) -> Result<u64, ValidationError> {
    match utils::parse_units(amount, decimals) {
        Ok(0) => Err(ValidationError::AmountTooSmall {
            amount: amount.trim().to_string(),
            symbol: symbol.to_string(),
        }),
        Ok(units) => Ok(units),
        Err(AmountError::Overflow(_)) => Err(ValidationError::AmountTooLarge {
            amount: amount.trim().to_string(),
            symbol: symbol.to_string(),
        }),
        Err(_) => Err(ValidationError::InvalidAmount),
    }
}
