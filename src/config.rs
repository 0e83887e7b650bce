use crate::balance::{NATIVE_POLL_INTERVAL, TOKEN_POLL_INTERVAL};
use crate::builder::DEFAULT_COMPUTE_UNIT_LIMIT;
use crate::rpc::SolanaRpc;
use crate::submitter::SenderConfig;
use crate::wallet::SendOptions;
use anyhow::{anyhow, Result};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Solana cluster the session talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cluster {
    Devnet,
    Testnet,
    MainnetBeta,
    Localnet,
}

/// Static facts about a cluster: CLI name, display label, default RPC and
/// the explorer `cluster` query value.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    pub cluster: Cluster,
    pub name: &'static str,
    pub label: &'static str,
    pub default_rpc: &'static str,
    pub explorer_param: Option<&'static str>,
}

impl ClusterInfo {
    pub const fn new(
        cluster: Cluster,
        name: &'static str,
        label: &'static str,
        default_rpc: &'static str,
        explorer_param: Option<&'static str>,
    ) -> Self {
        Self {
            cluster,
            name,
            label,
            default_rpc,
            explorer_param,
        }
    }
}

use Cluster::*;

pub const CLUSTERS: &[ClusterInfo] = &[
    ClusterInfo::new(Devnet, "devnet", "Solana Devnet", "https://api.devnet.solana.com", Some("devnet")),
    ClusterInfo::new(Testnet, "testnet", "Solana Testnet", "https://api.testnet.solana.com", Some("testnet")),
    ClusterInfo::new(MainnetBeta, "mainnet-beta", "Solana Mainnet Beta", "https://api.mainnet-beta.solana.com", None),
    ClusterInfo::new(Localnet, "localnet", "Local Validator", "http://127.0.0.1:8899", Some("custom")),
];

impl Cluster {
    pub fn info(&self) -> &'static ClusterInfo {
        // Every variant has a row in CLUSTERS
        CLUSTERS
            .iter()
            .find(|c| c.cluster == *self)
            .unwrap_or(&CLUSTERS[0])
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn label(&self) -> &'static str {
        self.info().label
    }

    pub fn default_rpc(&self) -> &'static str {
        self.info().default_rpc
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "mainnet" | "m" => "mainnet-beta",
            "d" => "devnet",
            "t" => "testnet",
            "l" | "localhost" => "localnet",
            other => other,
        };
        CLUSTERS
            .iter()
            .find(|c| c.name == wanted)
            .map(|c| c.cluster)
            .ok_or_else(|| {
                format!(
                    "Unknown cluster '{}' (expected devnet, testnet, mainnet-beta or localnet)",
                    s
                )
            })
    }
}

/// Solana Explorer link for a transaction signature.
pub fn get_tx_explorer_url(cluster: Cluster, rpc_url: &str, signature: &str) -> Option<String> {
    let mut url = Url::parse("https://explorer.solana.com/tx/").ok()?.join(signature).ok()?;
    if let Some(param) = cluster.info().explorer_param {
        let mut query = url.query_pairs_mut();
        query.append_pair("cluster", param);
        if cluster == Localnet {
            query.append_pair("customUrl", rpc_url);
        }
    }
    Some(url.to_string())
}

/// Solscan link for a transaction signature. Solscan cannot show local
/// validators.
pub fn get_solscan_url(cluster: Cluster, signature: &str) -> Option<String> {
    if cluster == Localnet {
        return None;
    }
    let mut url = Url::parse("https://solscan.io/tx/").ok()?.join(signature).ok()?;
    if let Some(param) = cluster.info().explorer_param {
        url.query_pairs_mut().append_pair("cluster", param);
    }
    Some(url.to_string())
}

/// Parse `processed`, `confirmed` or `finalized`.
pub fn parse_commitment(value: &str) -> Option<CommitmentLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "processed" => Some(CommitmentLevel::Processed),
        "confirmed" => Some(CommitmentLevel::Confirmed),
        "finalized" => Some(CommitmentLevel::Finalized),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub cluster: Cluster,
    pub rpc_url: String,
    pub commitment: CommitmentLevel,
    pub compute_unit_limit: u32,
    pub max_retries: usize,
    pub skip_preflight: bool,
    pub native_poll_interval: Duration,
    pub token_poll_interval: Duration,
    pub confirm_poll_interval: Duration,
    pub max_status_poll_errors: u32,
}

impl Config {
    /// Defaults for `cluster`, with `MULTISEND_*` environment overrides.
    pub fn new(cluster: Cluster) -> Self {
        Self::from_lookup(cluster, |key| env::var(key).ok())
    }

    fn from_lookup(cluster: Cluster, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let rpc_url = lookup("MULTISEND_RPC_URL")
            .filter(|v| Url::parse(v).is_ok())
            .unwrap_or_else(|| cluster.default_rpc().to_string());

        let commitment = lookup("MULTISEND_COMMITMENT")
            .and_then(|v| parse_commitment(&v))
            .unwrap_or(CommitmentLevel::Confirmed);

        let compute_unit_limit = lookup("MULTISEND_COMPUTE_UNIT_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_COMPUTE_UNIT_LIMIT);

        let max_retries = lookup("MULTISEND_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Self {
            cluster,
            rpc_url,
            commitment,
            compute_unit_limit,
            max_retries,
            skip_preflight: false,
            native_poll_interval: NATIVE_POLL_INTERVAL,
            token_poll_interval: TOKEN_POLL_INTERVAL,
            confirm_poll_interval: Duration::from_millis(500),
            max_status_poll_errors: 10,
        }
    }

    pub fn from_env() -> Self {
        let cluster = env::var("MULTISEND_CLUSTER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Devnet);
        Self::new(cluster)
    }

    /// Override the RPC endpoint. Only http(s) URLs are accepted.
    pub fn with_rpc_url(mut self, rpc_url: &str) -> Result<Self> {
        let url = Url::parse(rpc_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(anyhow!("Unsupported RPC URL scheme '{}'", url.scheme()));
        }
        self.rpc_url = rpc_url.to_string();
        Ok(self)
    }

    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment,
        }
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            skip_preflight: self.skip_preflight,
            preflight_commitment: CommitmentLevel::Confirmed,
            max_retries: self.max_retries,
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            commitment: self.commitment_config(),
            send_options: self.send_options(),
            compute_unit_limit: self.compute_unit_limit,
            confirm_poll_interval: self.confirm_poll_interval,
            max_status_poll_errors: self.max_status_poll_errors,
        }
    }

    pub fn tx_explorer_url(&self, signature: &str) -> Option<String> {
        get_tx_explorer_url(self.cluster, &self.rpc_url, signature)
    }

    pub fn solscan_url(&self, signature: &str) -> Option<String> {
        get_solscan_url(self.cluster, signature)
    }

    pub fn get_rpc(&self) -> Arc<SolanaRpc> {
        Arc::new(SolanaRpc::new(self.rpc_url.clone(), self.commitment_config()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Devnet)
    }
}
