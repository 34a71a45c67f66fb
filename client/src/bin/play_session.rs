//! Plays one full game against a poker contract on a JSON-RPC node.
//!
//! Usage:
//!   cargo run --release --bin play-session -- --contract <ADDRESS> [--player <ADDRESS>]...

use anyhow::{bail, Context, Result};
use clap::Parser;
use holdem_client::{
    EvmConfig, EvmLedger, PollWindow, RetryPolicy, RotatingPolicy, SessionOrchestrator,
};
use holdem_types::{card::describe, format_ether, Address, Ether};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play a full holdem session against the poker contract")]
struct Args {
    /// JSON-RPC endpoint of the node.
    #[arg(long, env = "HOLDEM_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Address of the deployed poker contract.
    #[arg(long, env = "HOLDEM_CONTRACT")]
    contract: Address,

    #[arg(long, env = "HOLDEM_CHAIN_ID", default_value = "31337")]
    chain_id: u64,

    /// Comma separated private keys to sign with locally.
    #[arg(long, env = "HOLDEM_PRIVATE_KEYS", value_delimiter = ',')]
    private_keys: Vec<String>,

    /// Participant accounts, in seat order. Defaults to the local signers, or
    /// the node's unlocked accounts after the first.
    #[arg(long = "player", env = "HOLDEM_PLAYERS", value_delimiter = ',')]
    players: Vec<Address>,

    /// Account that creates and starts the game.
    #[arg(long, env = "HOLDEM_DEALER")]
    dealer: Option<Address>,

    #[arg(long, default_value = "1.0")]
    buy_in: Ether,

    /// Bet placed by every third player each round.
    #[arg(long, default_value = "0.1")]
    bet: Ether,

    #[arg(long, default_value = "1")]
    confirmations: usize,

    /// Number of one-second polls for the GameEnded event.
    #[arg(long, default_value = "60")]
    result_polls: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = EvmConfig::new(args.rpc_url.clone(), args.contract);
    config.chain_id = args.chain_id;
    config.confirmations = args.confirmations;
    config.private_keys = args.private_keys.clone();
    let ledger = EvmLedger::new(config).context("failed to connect to ledger")?;

    let mut players = args.players.clone();
    let mut dealer = args.dealer;
    if players.is_empty() {
        players = ledger.local_signers();
    }
    if players.is_empty() {
        let accounts = ledger
            .node_accounts()
            .await
            .context("failed to list node accounts")?;
        dealer = dealer.or_else(|| accounts.first().copied());
        players = accounts.into_iter().skip(1).take(3).collect();
    }
    if players.len() < 2 {
        bail!("need at least two players, got {}", players.len());
    }

    let mut orchestrator = SessionOrchestrator::new(ledger)
        .with_retry_policy(RetryPolicy::default())
        .with_poll_window(PollWindow {
            attempts: args.result_polls,
            interval: Duration::from_secs(1),
        });
    if let Some(dealer) = dealer {
        orchestrator = orchestrator.with_dealer(dealer);
    }
    info!(players = players.len(), buy_in = %args.buy_in, "starting session");

    let outcome = orchestrator
        .run_session(
            args.buy_in.wei(),
            &players,
            RotatingPolicy { bet: args.bet.wei() },
        )
        .await
        .context("session failed")?;

    println!("Game {}", outcome.session.id);
    for (player, cards) in &outcome.hands {
        println!("  {player}: {}", describe(cards));
    }
    println!("Community cards: {}", describe(&outcome.board));
    if !outcome.folded.is_empty() {
        let folded: Vec<String> = outcome.folded.iter().map(|p| p.to_string()).collect();
        println!("Folded: {}", folded.join(", "));
    }
    println!(
        "Winner: {} ({} ether)",
        outcome.result.winner,
        format_ether(outcome.result.winning_amount)
    );
    Ok(())
}
