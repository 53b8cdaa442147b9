use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tradegate_engine::TradingAgent;
use tradegate_models::agent_config::{AgentMode, ConfigPatch, PsychologyMode};
use tradegate_models::decision::{DecisionFilter, DecisionResult, UserAction};
use tradegate_models::world_state::Timeframe;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "tradegate", about = "Mode-gated trade proposals with an audit ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tradegate.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proposal pipeline for one symbol
    Propose {
        symbol: String,
        #[arg(short, long, default_value = "1h")]
        timeframe: Timeframe,
    },
    /// Show or change the operating mode
    Mode {
        #[command(subcommand)]
        action: ModeAction,
    },
    /// Show or patch the agent config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Engage (`on`) or release (`off`) the kill switch
    Kill { state: KillState },
    /// Record the human's answer to a logged proposal
    Decide {
        id: Uuid,
        /// approved, rejected or modified
        action: UserAction,
        #[arg(long)]
        notes: Option<String>,
        /// Execution result as JSON
        #[arg(long)]
        result: Option<String>,
    },
    /// List logged decisions, newest first
    Decisions {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        action: Option<UserAction>,
        /// Inclusive lower bound, RFC 3339
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Inclusive upper bound, RFC 3339
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Kill switch and venue health
    Health,
    /// Whether a logged decision may be executed now
    Permit { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum ModeAction {
    Get,
    /// off, learn, paper or live_assisted
    Set { mode: AgentMode },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        max_risk_per_trade: Option<Decimal>,
        #[arg(long)]
        daily_loss_limit: Option<Decimal>,
        /// Replaces the allowlist. Repeat for several symbols.
        #[arg(long = "allow")]
        allowed_symbols: Vec<String>,
        /// Remove every allowlist entry
        #[arg(long, conflicts_with = "allowed_symbols")]
        clear_allowlist: bool,
        #[arg(long)]
        psychology_mode: Option<PsychologyMode>,
        #[arg(long)]
        allow_overnight: Option<bool>,
        #[arg(long)]
        max_open_positions: Option<u32>,
        #[arg(long)]
        trading_enabled: Option<bool>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KillState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable (respects RUST_LOG)
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = tradegate::load_config(&cli.config)?;
    let agent = tradegate::build_agent(&config).context("Failed to build agent")?;

    run(&agent, cli.command, cli.pretty).await
}

async fn run(agent: &TradingAgent, command: Command, pretty: bool) -> Result<()> {
    match command {
        Command::Propose { symbol, timeframe } => {
            let outcome = agent
                .propose_trade(&symbol, timeframe)
                .await
                .context("Proposal failed")?;
            print_json(&outcome, pretty)
        }
        Command::Mode { action } => match action {
            ModeAction::Get => {
                let mode = agent.get_mode().await?;
                print_json(&serde_json::json!({ "mode": mode }), pretty)
            }
            ModeAction::Set { mode } => print_json(&agent.set_mode(mode).await?, pretty),
        },
        Command::Config { action } => match action {
            ConfigAction::Show => print_json(&agent.get_config().await?, pretty),
            ConfigAction::Set {
                max_risk_per_trade,
                daily_loss_limit,
                allowed_symbols,
                clear_allowlist,
                psychology_mode,
                allow_overnight,
                max_open_positions,
                trading_enabled,
            } => {
                let allowed_symbols = if clear_allowlist {
                    Some(BTreeSet::new())
                } else if allowed_symbols.is_empty() {
                    None
                } else {
                    Some(allowed_symbols.into_iter().collect())
                };
                let patch = ConfigPatch {
                    mode: None,
                    max_risk_per_trade,
                    daily_loss_limit,
                    allowed_symbols,
                    psychology_mode,
                    allow_overnight,
                    max_open_positions,
                    trading_enabled,
                };
                if patch.is_empty() {
                    anyhow::bail!("config set needs at least one field");
                }
                print_json(&agent.set_config(patch).await?, pretty)
            }
        },
        Command::Kill { state } => {
            let trading_enabled = matches!(state, KillState::Off);
            print_json(&agent.set_kill_switch(trading_enabled).await?, pretty)
        }
        Command::Decide {
            id,
            action,
            notes,
            result,
        } => {
            let result: Option<DecisionResult> = result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Failed to parse --result JSON")?;
            let record = agent
                .record_user_decision(id, action, notes, result)
                .await
                .with_context(|| format!("Failed to record decision {id}"))?;
            print_json(&record, pretty)
        }
        Command::Decisions {
            symbol,
            action,
            since,
            until,
            limit,
        } => {
            let mut filter = DecisionFilter {
                since,
                until,
                user_action: action,
                symbol,
                ..Default::default()
            };
            if let Some(limit) = limit {
                filter.limit = limit;
            }
            print_json(&agent.list_decisions(&filter).await?, pretty)
        }
        Command::Health => print_json(&agent.health().await?, pretty),
        Command::Permit { id } => print_json(&agent.execution_permit(id).await?, pretty),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
