//! Known tokens: the built-in devnet list plus tokens added by the user.

use crate::rpc::ChainRpc;
use crate::types::TokenDescriptor;
use anyhow::{Context, Result};
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Mint;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

const LOGO_BASE: &str = "https://raw.githubusercontent.com/solana-labs/token-list/main/assets/mainnet";

/// Logo shown for user-added tokens (the USDC icon).
pub const DEFAULT_CUSTOM_TOKEN_LOGO: &str = "https://raw.githubusercontent.com/solana-labs/token-list/main/assets/mainnet/EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v/logo.png";

pub const CUSTOM_TOKEN_SYMBOL: &str = "SPL Token";

/// Seed entry for the built-in list.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinToken {
    pub address: &'static str,
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    /// Mainnet mint whose logo is reused
    pub logo_mint: &'static str,
}

impl BuiltinToken {
    const fn new(
        address: &'static str,
        symbol: &'static str,
        name: &'static str,
        decimals: u8,
        logo_mint: &'static str,
    ) -> Self {
        Self {
            address,
            symbol,
            name,
            decimals,
            logo_mint,
        }
    }

    pub fn descriptor(&self) -> TokenDescriptor {
        TokenDescriptor {
            address: self.address.to_string(),
            symbol: self.symbol.to_string(),
            name: self.name.to_string(),
            decimals: self.decimals,
            logo_uri: Some(format!("{}/{}/logo.png", LOGO_BASE, self.logo_mint)),
        }
    }
}

pub const DEVNET_TOKENS: &[BuiltinToken] = &[
    BuiltinToken::new(
        "So11111111111111111111111111111111111111112",
        "SOL",
        "Solana",
        9,
        "So11111111111111111111111111111111111111112",
    ),
    BuiltinToken::new(
        "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
        "USDC",
        "USD Coin (Devnet)",
        6,
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    ),
    BuiltinToken::new(
        "3vxj94fSd3jrhaGAwaEKGDPEwn5Yqs81Ay3GAGgqQxcZ",
        "SRM",
        "Serum (Devnet)",
        6,
        "SRMuApVNdxXokk5GT7XD5cUUgXMBCoAz2LHeuAoKWRt",
    ),
    BuiltinToken::new(
        "BLwTnYKqf7u4qjgZrrsKeNs2EzWkMLqVCu6j8iHyrNA3",
        "BTC",
        "Bitcoin (Devnet)",
        8,
        "9n4nbM75f5Ui33ZbPYXn59EwSgE8CGsHtAeTH5YFeJ9E",
    ),
    BuiltinToken::new(
        "CtMyWsrUtAwXWiGr9WjHT5fC3p3fgV8cyGpLTo2LJzG1",
        "ETH",
        "Ethereum (Devnet)",
        8,
        "7vfCXTUXx5WJV5JADk17DUJ4ksgau7utNKj4b963voxs",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Please enter a token address")]
    EmptyAddress,
    #[error("Token already added")]
    AlreadyAdded,
    #[error("Invalid token address or token not found")]
    NotFound,
}

/// "Custom SPL Token (ABCD...WXYZ)"
fn custom_token_name(address: &str) -> String {
    let head: String = address.chars().take(4).collect();
    let tail: String = address
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("Custom SPL Token ({}...{})", head, tail)
}

#[derive(Debug, Clone)]
pub struct TokenRegistry {
    builtin: Vec<TokenDescriptor>,
    custom: Vec<TokenDescriptor>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::devnet()
    }
}

impl TokenRegistry {
    pub fn devnet() -> Self {
        Self::with_builtin(DEVNET_TOKENS.iter().map(BuiltinToken::descriptor).collect())
    }

    pub fn with_builtin(builtin: Vec<TokenDescriptor>) -> Self {
        Self {
            builtin,
            custom: Vec::new(),
        }
    }

    /// Built-ins first, then user-added tokens in insertion order.
    pub fn all(&self) -> Vec<TokenDescriptor> {
        self.builtin.iter().chain(self.custom.iter()).cloned().collect()
    }

    pub fn custom(&self) -> &[TokenDescriptor] {
        &self.custom
    }

    pub fn find(&self, address: &str) -> Option<&TokenDescriptor> {
        let address = address.trim();
        self.builtin
            .iter()
            .chain(self.custom.iter())
            .find(|t| t.address == address)
    }

    pub fn find_symbol(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.builtin
            .iter()
            .chain(self.custom.iter())
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// The wrapped-SOL entry standing in for the native coin.
    pub fn native(&self) -> Option<&TokenDescriptor> {
        self.builtin.iter().chain(self.custom.iter()).find(|t| t.is_native())
    }

    /// Look `address` up on chain and append it when it is a mint.
    pub async fn add_custom(
        &mut self,
        address: &str,
        rpc: &dyn ChainRpc,
    ) -> Result<TokenDescriptor, RegistryError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(RegistryError::EmptyAddress);
        }

        let mint = Pubkey::from_str(address).map_err(|_| RegistryError::NotFound)?;

        if self.find(address).is_some() {
            return Err(RegistryError::AlreadyAdded);
        }

        let account = match rpc.get_account(&mint).await {
            Ok(Some(account)) if account.owner == spl_token::id() => account,
            Ok(_) => return Err(RegistryError::NotFound),
            Err(e) => {
                debug!("Mint lookup for {} failed: {}", address, e);
                return Err(RegistryError::NotFound);
            }
        };
        let state = Mint::unpack(&account.data).map_err(|_| RegistryError::NotFound)?;

        let token = TokenDescriptor {
            address: address.to_string(),
            symbol: CUSTOM_TOKEN_SYMBOL.to_string(),
            name: custom_token_name(address),
            decimals: state.decimals,
            logo_uri: Some(DEFAULT_CUSTOM_TOKEN_LOGO.to_string()),
        };
        info!("Added custom token {} ({} decimals)", address, token.decimals);
        self.custom.push(token.clone());
        Ok(token)
    }

    /// Append tokens not already known. Returns how many were added.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = TokenDescriptor>) -> usize {
        let mut added = 0;
        for token in tokens {
            if self.find(&token.address).is_none() {
                self.custom.push(token);
                added += 1;
            }
        }
        added
    }

    /// Read extra descriptors from a JSON array of token entries.
    pub fn load_token_list(&mut self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token list {}", path.display()))?;
        let tokens: Vec<TokenDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid token list {}", path.display()))?;
        for token in &tokens {
            token.mint().with_context(|| {
                format!("Invalid mint address '{}' in token list", token.address)
            })?;
        }
        let added = self.extend(tokens);
        info!("Loaded {} tokens from {}", added, path.display());
        Ok(added)
    }
}
