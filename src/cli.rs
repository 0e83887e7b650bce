//! Command-line front end over [`MultiSendSession`].

use crate::balance;
use crate::config::{Cluster, Config};
use crate::recipients::RecipientList;
use crate::session::MultiSendSession;
use crate::token_registry::TokenRegistry;
use crate::wallet::KeypairWallet;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Send SOL or an SPL token to many recipients in one transaction.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Cluster to use: devnet, testnet, mainnet-beta or localnet.
    #[clap(long, short, global = true)]
    pub cluster: Option<Cluster>,

    /// RPC endpoint, overriding the cluster default.
    #[clap(long, global = true)]
    pub rpc_url: Option<String>,

    /// JSON file with extra token descriptors.
    #[clap(long, global = true)]
    pub token_list: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one batch transaction.
    Send {
        /// Solana CLI keypair file of the sender.
        #[clap(long, short)]
        keypair: PathBuf,

        /// CSV file of `address,amount` rows.
        #[clap(long, short)]
        recipients: PathBuf,

        /// Mint address of the token to send. Sends SOL when omitted.
        #[clap(long, short)]
        token: Option<String>,

        /// Sign without asking for confirmation.
        #[clap(long, short)]
        yes: bool,
    },
    /// Show SOL and token balances of an account.
    Balances {
        #[clap(long, short)]
        owner: Pubkey,
    },
    /// List known tokens.
    Tokens,
}

fn build_config(cli: &Cli) -> Result<Config> {
    let config = match cli.cluster {
        Some(cluster) => Config::new(cluster),
        None => Config::from_env(),
    };
    match &cli.rpc_url {
        Some(url) => config
            .with_rpc_url(url)
            .with_context(|| format!("Invalid RPC URL '{}'", url)),
        None => Ok(config),
    }
}

fn build_registry(cli: &Cli) -> Result<TokenRegistry> {
    let mut registry = TokenRegistry::devnet();
    if let Some(path) = &cli.token_list {
        registry.load_token_list(path)?;
    }
    Ok(registry)
}

fn confirm_on_terminal(transaction: &Transaction) -> bool {
    tokio::task::block_in_place(|| {
        print!(
            "Sign transaction with {} instructions? [y/N] ",
            transaction.message.instructions.len()
        );
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    })
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let registry = build_registry(&cli)?;
    info!("Using {} at {}", config.cluster.label(), config.rpc_url);

    match &cli.command {
        Command::Send {
            keypair,
            recipients,
            token,
            yes,
        } => send(config, registry, keypair, recipients, token.as_deref(), *yes).await,
        Command::Balances { owner } => balances(config, registry, owner).await,
        Command::Tokens => {
            for token in registry.all() {
                println!(
                    "{:<10} {:<45} {:>2}  {}",
                    token.symbol, token.address, token.decimals, token.name
                );
            }
            Ok(())
        }
    }
}

async fn send(
    config: Config,
    registry: TokenRegistry,
    keypair: &Path,
    recipients: &Path,
    token: Option<&str>,
    yes: bool,
) -> Result<()> {
    let rpc = config.get_rpc();
    let mut wallet = KeypairWallet::from_file(keypair, rpc.clone())?;
    if !yes {
        wallet = wallet.with_approval(Box::new(confirm_on_terminal));
    }

    let file = File::open(recipients)
        .with_context(|| format!("Failed to open recipients file {}", recipients.display()))?;
    let list = RecipientList::from_csv_reader(file)?;

    let mut session = MultiSendSession::with_registry(config, rpc, Arc::new(wallet), registry);
    *session.recipients_mut() = list;

    if let Some(mint) = token {
        if !session.select_token_address(mint) {
            session
                .add_custom_token(mint)
                .await
                .map_err(|e| anyhow!("{}: {}", mint, e))?;
        }
    }

    println!(
        "{} to {} recipients on {}",
        session.send_label(),
        session.recipients().len(),
        session.config().cluster.label()
    );

    let result = session.send().await.map_err(|e| anyhow!(e.user_message()))?;
    println!("{}", result.status);
    if let Some(signature) = result.signature {
        println!("Signature: {}", signature);
    }
    if let Some(url) = session.explorer_url() {
        println!("Solana Explorer: {}", url);
    }
    if let Some(url) = session.solscan_url() {
        println!("Solscan: {}", url);
    }

    if result.is_confirmed() {
        Ok(())
    } else {
        Err(anyhow!(result.error.unwrap_or(result.status)))
    }
}

async fn balances(config: Config, registry: TokenRegistry, owner: &Pubkey) -> Result<()> {
    let rpc = config.get_rpc();
    let native = balance::fetch_native_balance(rpc.as_ref(), owner).await?;
    println!("{:<10} {}", "SOL", native.display_short());

    let tokens = registry.all();
    let snapshot = balance::fetch_token_balances(rpc.as_ref(), owner, &tokens).await;
    for token in tokens.iter().filter(|t| !t.is_native()) {
        if let Some(amount) = snapshot.get(&token.address) {
            println!("{:<10} {}", token.symbol, amount.display_short());
        }
    }
    Ok(())
}
