use clap::{Parser, Subcommand, ValueEnum};
use clearing_adapters::{FeeScheduleConfig, MirrorStorageConfig};
use clearing_cli::{read_json, ClearingRuntime, HonoringMode, RuntimeConfig};
use clearing_core::{ClearingEngineConfig, CorrectionIntent, ObligationIntent};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MirrorStorageMode {
    Auto,
    Memory,
    Tracing,
    Postgres,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HonoringRail {
    Ach,
    AlwaysFail,
    None,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one obligation intent.
    Submit {
        #[arg(long)]
        intent: PathBuf,
    },
    /// Submit a JSON array of obligation intents as one batch.
    Batch {
        #[arg(long)]
        intents: PathBuf,
        /// Overrides --max-batch-size for this batch.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Submit an obligation, then a correction against the transfer it cleared.
    /// The correction's `original_ref` is replaced by that transfer id.
    Correct {
        #[arg(long)]
        original: PathBuf,
        #[arg(long)]
        correction: PathBuf,
    },
    /// Run a batch, then reconcile ACH records against cleared transfers.
    Reconcile {
        #[arg(long)]
        intents: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "clearingctl", version, about = "Obligation clearing core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Upper bound on one clearing call, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "CLEARING_TIMEOUT_MS")]
    clearing_timeout_ms: u64,
    /// Upper bound on one honoring attempt, in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "CLEARING_HONORING_TIMEOUT_MS")]
    honoring_timeout_ms: u64,
    /// Upper bound on one detached mirror write, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "CLEARING_MIRROR_TIMEOUT_MS")]
    mirror_timeout_ms: u64,
    #[arg(long, default_value_t = 500, env = "CLEARING_MAX_BATCH_SIZE")]
    max_batch_size: usize,
    /// Processing fee in basis points.
    #[arg(long, default_value_t = 25, env = "CLEARING_PROCESSING_BPS")]
    processing_bps: u32,
    /// Flat honoring fee in minor units.
    #[arg(long, default_value_t = 30, env = "CLEARING_HONORING_FEE_MINOR")]
    honoring_fee_minor: u64,
    #[arg(long, value_enum, default_value_t = HonoringRail::Ach, env = "CLEARING_HONORING")]
    honoring: HonoringRail,
    /// Recipients the ACH adapter refuses. Repeatable.
    #[arg(long = "ineligible-recipient")]
    ineligible_recipients: Vec<String>,
    /// Accounts the reference authority refuses to clear. Repeatable.
    #[arg(long = "reject-account")]
    rejected_accounts: Vec<String>,
    /// Narrative mirror backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = MirrorStorageMode::Auto, env = "CLEARING_MIRROR_STORAGE")]
    mirror_storage: MirrorStorageMode,
    /// PostgreSQL url for the narrative mirror.
    #[arg(long, env = "CLEARING_MIRROR_DATABASE_URL")]
    mirror_database_url: Option<String>,
    #[arg(long, default_value_t = 5, env = "CLEARING_MIRROR_PG_MAX_CONNECTIONS")]
    mirror_pg_max_connections: u32,
    /// Time given to detached mirror writes before the process exits, in milliseconds.
    #[arg(long, default_value_t = 250, env = "CLEARING_MIRROR_GRACE_MS")]
    mirror_grace_ms: u64,
}

fn resolve_mirror_storage(cli: &Cli) -> anyhow::Result<MirrorStorageConfig> {
    let resolved_url = cli
        .mirror_database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.mirror_storage {
        MirrorStorageMode::Memory => MirrorStorageConfig::Memory,
        MirrorStorageMode::Tracing => MirrorStorageConfig::Tracing,
        MirrorStorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!(
                    "mirror_storage=postgres requires --mirror-database-url or DATABASE_URL"
                )
            })?;
            MirrorStorageConfig::postgres(database_url, cli.mirror_pg_max_connections)
        }
        MirrorStorageMode::Auto => match resolved_url {
            Some(database_url) => {
                MirrorStorageConfig::postgres(database_url, cli.mirror_pg_max_connections)
            }
            None => MirrorStorageConfig::Tracing,
        },
    };

    Ok(storage)
}

fn runtime_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    Ok(RuntimeConfig {
        engine: ClearingEngineConfig {
            clearing_timeout: Duration::from_millis(cli.clearing_timeout_ms),
            honoring_timeout: Duration::from_millis(cli.honoring_timeout_ms),
            mirror_timeout: Duration::from_millis(cli.mirror_timeout_ms),
            max_batch_size: cli.max_batch_size,
        },
        fees: FeeScheduleConfig {
            processing_bps: cli.processing_bps,
            honoring_fee_minor: cli.honoring_fee_minor,
            ..FeeScheduleConfig::default()
        },
        mirror: resolve_mirror_storage(cli)?,
        honoring: match cli.honoring {
            HonoringRail::Ach => HonoringMode::Ach,
            HonoringRail::AlwaysFail => HonoringMode::AlwaysFail,
            HonoringRail::None => HonoringMode::Disabled,
        },
        ineligible_recipients: cli.ineligible_recipients.clone(),
        rejected_accounts: cli.rejected_accounts.clone(),
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "clearingctl=info,clearing_core=info,info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = ClearingRuntime::bootstrap(runtime_config(&cli)?).await?;

    match &cli.command {
        Command::Submit { intent } => {
            let intent: ObligationIntent = read_json(intent)?;
            print_json(&runtime.submit(intent).await)?;
        }
        Command::Batch { intents, limit } => {
            let items: Vec<ObligationIntent> = read_json(intents)?;
            print_json(&runtime.batch(items, *limit).await?)?;
        }
        Command::Correct {
            original,
            correction,
        } => {
            let original: ObligationIntent = read_json(original)?;
            let correction: CorrectionIntent = read_json(correction)?;
            print_json(&runtime.correct(original, correction).await?)?;
        }
        Command::Reconcile { intents } => {
            let items: Vec<ObligationIntent> = read_json(intents)?;
            print_json(&runtime.reconcile(items).await?)?;
        }
    }

    if cli.mirror_grace_ms > 0 {
        info!(grace_ms = cli.mirror_grace_ms, "waiting for detached mirror writes");
        tokio::time::sleep(Duration::from_millis(cli.mirror_grace_ms)).await;
    }

    Ok(())
}
