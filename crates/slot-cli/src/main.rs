//! slotctl: command-line slot client
//!
//! Usage:
//!   slotctl spin [--count N]                  - Manual spins at the current bet
//!   slotctl auto --spins N [--stop-on-jackpot] [--stop-on-big-win [--big-win X]]
//!   slotctl presets                           - Auto-spin presets and affordability
//!
//! Outcomes come from the built-in simulator unless `--connect` names a
//! server (`ws://`, `wss://` or `tcp://host:port`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use slot_connector::ConnectorBuilder;
use slot_core::{BetLimits, ClientConfig, Credits, MachineConfig, SessionConfig, SessionStats};
use slot_session::{
    AutoSpinParams, AutoSpinReport, GameSession, SessionEvent, SharedBalance, SpinAttempt,
    SpinProvider,
};
use slot_sim::SyntheticSpinProvider;

#[derive(Parser)]
#[command(name = "slotctl", about = "Slot machine client")]
struct Cli {
    /// Machine and session config (.json, .yaml or .yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Game server address; the local simulator is used when omitted
    #[arg(long, global = true)]
    connect: Option<String>,

    /// Auth token sent when connecting
    #[arg(long, global = true)]
    auth: Option<String>,

    /// Seed for the local simulator
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Starting balance
    #[arg(long, global = true, default_value_t = 1_000)]
    balance: Credits,

    /// Bet per spin (clamped to the machine limits)
    #[arg(long, global = true)]
    bet: Option<Credits>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manual spins
    Spin {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Auto-spin run
    Auto {
        #[arg(short, long)]
        spins: u32,

        #[arg(long)]
        stop_on_jackpot: bool,

        #[arg(long)]
        stop_on_big_win: bool,

        /// Big-win threshold in credits (default: configured multiple of the bet)
        #[arg(long, requires = "stop_on_big_win")]
        big_win: Option<Credits>,
    },
    /// Show auto-spin presets
    Presets,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let provider = open_provider(&cli).await?;
    let ledger = Arc::new(SharedBalance::new(cli.balance));
    let session = GameSession::new(config, provider, ledger);

    if let Some(bet) = cli.bet {
        let accepted = session.set_bet(bet);
        if accepted != bet {
            log::warn!("[slotctl] Bet {} clamped to {}", bet, accepted);
        }
    }

    match cli.command {
        Commands::Spin { count } => run_spins(&session, count).await?,
        Commands::Auto {
            spins,
            stop_on_jackpot,
            stop_on_big_win,
            big_win,
        } => {
            let mut params = session.auto_spin_params(spins);
            if stop_on_jackpot {
                params = params.stop_on_jackpot();
            }
            if stop_on_big_win {
                params = params.stop_on_big_win(big_win.unwrap_or(params.big_win_threshold));
            }
            let report = run_auto(&session, params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Presets => {
            for &spins in session.presets() {
                let marker = if session.can_afford_auto_spin(spins) {
                    "ok"
                } else {
                    "insufficient balance"
                };
                let total = session.bet().saturating_mul(Credits::from(spins));
                println!("{:>5} spins x {} = {:>8}  {}", spins, session.bet(), total, marker);
            }
            return Ok(());
        }
    }

    print_stats(&session.end_session().await)?;
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ClientConfig {
            machine: MachineConfig::new("demo", BetLimits::default()),
            session: SessionConfig::default(),
        }),
    }
}

async fn open_provider(cli: &Cli) -> Result<Arc<dyn SpinProvider>> {
    let Some(address) = &cli.connect else {
        log::info!("[slotctl] Using local simulator (seed {:?})", cli.seed);
        return Ok(Arc::new(SyntheticSpinProvider::new(cli.balance, cli.seed)));
    };

    if cli.seed.is_some() {
        bail!("--seed only applies to the local simulator");
    }

    let mut builder = ConnectorBuilder::from_url(address)?;
    if let Some(token) = &cli.auth {
        builder = builder.auth(token);
    }
    let provider = builder
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;
    Ok(Arc::new(provider))
}

async fn run_spins(session: &GameSession, count: u32) -> Result<()> {
    for index in 1..=count {
        match session.spin().await? {
            SpinAttempt::Settled(settlement) => {
                let outcome = &settlement.outcome;
                let reels: Vec<&str> = outcome.reels.iter().map(|s| s.name()).collect();
                println!(
                    "#{:<4} [{}] bet={} win={}{} balance={}",
                    index,
                    reels.join(" | "),
                    settlement.bet_amount(),
                    outcome.credited_win(),
                    if outcome.is_jackpot { " JACKPOT" } else { "" },
                    outcome.new_current_balance
                );
            }
            SpinAttempt::Failed(error) => bail!("Spin {} failed: {}", index, error),
            SpinAttempt::Ignored => log::warn!("[slotctl] Spin {} ignored", index),
        }
    }
    Ok(())
}

async fn run_auto(
    session: &GameSession,
    params: AutoSpinParams,
) -> Result<AutoSpinReport> {
    let printer = tokio::spawn(print_progress(session.subscribe()));
    let run = session.start_auto_spin(params)?;

    let finished = run.finished();
    tokio::pin!(finished);

    let report = tokio::select! {
        report = &mut finished => report,
        _ = tokio::signal::ctrl_c() => {
            log::info!("[slotctl] Interrupted, stopping auto-spin");
            session.stop_auto_spin();
            finished.await
        }
    };

    let _ = printer.await;
    report.context("Auto-spin run aborted")
}

async fn print_progress(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::AutoSpinProgress(policy)) => {
                println!(
                    "auto {}/{}  ({} left)",
                    policy.settled(),
                    policy.total_requested,
                    policy.remaining
                );
            }
            Ok(SessionEvent::SpinFailed { error, .. }) => println!("spin failed: {}", error),
            Ok(SessionEvent::AutoSpinFinished(_)) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("[slotctl] Skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_stats(stats: &SessionStats) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    println!(
        "rtp={:.1}% hit_rate={:.1}% average_bet={:.1}",
        stats.rtp(),
        stats.hit_rate(),
        stats.average_bet()
    );
    Ok(())
}
