//! XAUUSD signal agent CLI.
//!
//! Commands:
//! - `startup` creates the journal schema and seeds evaluator config v1
//! - `live` evaluates one observation (JSON file or `-` for stdin)
//! - `review` runs and stores a learning review over a window
//! - `transition`, `outcome` advance a plan and record its result
//! - `apply-review` turns a review's action items into the next config version
//! - `plans` lists stored plans

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use learning_aggregator::render_report;
use notification_service::NotificationService;
use signal_agent::{AgentConfig, CycleOutcome, SignalPipeline};
use signal_core::{MarketObservation, OutcomeCategory, OutcomeReport, PlanStatus};
use trade_journal::JournalDb;

#[derive(Parser)]
#[command(
    name = "signal-agent",
    about = "XAUUSD setup evaluation, trade journal and learning reviews"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed evaluator configuration version 1.
    Startup,
    /// Evaluate one market observation.
    Live {
        /// Observation JSON file, or `-` to read stdin.
        #[arg(long)]
        observation: PathBuf,
    },
    /// Run a learning review and print its report.
    Review {
        /// Window length ending now, in days.
        #[arg(long, default_value_t = 7, conflicts_with_all = ["start", "end"])]
        days: i64,

        /// Window start (YYYY-MM-DD or RFC 3339).
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Window end (YYYY-MM-DD or RFC 3339). A bare date means end of that day.
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// Move a plan to executed, cancelled or ignored.
    Transition {
        #[arg(long)]
        plan: i64,

        #[arg(long)]
        status: PlanStatus,
    },
    /// Record the realized result of an executed plan.
    Outcome {
        #[arg(long)]
        plan: i64,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        exit: f64,

        /// win, loss or break_even
        #[arg(long)]
        outcome: OutcomeCategory,

        /// Realized R-multiple.
        #[arg(long, allow_hyphen_values = true)]
        r: f64,

        /// Realized P&L in percent of the account.
        #[arg(long, allow_hyphen_values = true)]
        pnl: f64,

        #[arg(long)]
        comments: Option<String>,
    },
    /// Apply a review's action items as the next configuration version.
    ApplyReview {
        #[arg(long)]
        review: i64,
    },
    /// List plans, newest first.
    Plans {
        #[arg(long)]
        status: Option<PlanStatus>,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// `YYYY-MM-DD` (start or end of day) or a full RFC 3339 timestamp
fn parse_instant(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {raw}"))?;
    let start = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {raw}"))?
        .and_utc();
    Ok(if end_of_day {
        start + Duration::days(1) - Duration::microseconds(1)
    } else {
        start
    })
}

fn read_observation(path: &PathBuf) -> Result<MarketObservation> {
    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read observation from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&json).context("Observation is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let cli = Cli::parse();
    let config = AgentConfig::from_env()?;

    let journal = JournalDb::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open journal at {}", config.database_url))?
        .with_retry_policy(config.retry_policy());
    let notifier = NotificationService::new(&config.notifications);
    let pipeline = SignalPipeline::new(journal, config, notifier);

    match cli.command {
        Commands::Startup => {
            let active = pipeline.startup().await?;
            println!("{}", serde_json::to_string_pretty(&active)?);
        }
        Commands::Live { observation } => {
            let observation = read_observation(&observation)?;
            match pipeline.evaluate_cycle(&observation).await? {
                CycleOutcome::PlanCreated { plan, .. } => {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                }
                CycleOutcome::NoTrade {
                    snapshot_id,
                    rejection,
                } => {
                    println!("NO TRADE ({}): {}", rejection.reason, rejection.detail);
                    tracing::debug!(snapshot_id, "Cycle finished without a plan");
                }
            }
        }
        Commands::Review { days, start, end } => {
            let (window_start, window_end) = match (start, end) {
                (Some(start), Some(end)) => (parse_instant(&start, false)?, parse_instant(&end, true)?),
                _ => {
                    if days <= 0 {
                        bail!("--days must be positive");
                    }
                    let now = Utc::now();
                    (now - Duration::days(days), now)
                }
            };
            let review = pipeline.run_review(window_start, window_end).await?;
            println!("{}", render_report(&review));
        }
        Commands::Transition { plan, status } => {
            let plan = pipeline.transition_plan(plan, status).await?;
            println!("Plan {} is now {}", plan.id.unwrap_or_default(), plan.status);
        }
        Commands::Outcome {
            plan,
            entry,
            exit,
            outcome,
            r,
            pnl,
            comments,
        } => {
            let report = OutcomeReport {
                entry_price: entry,
                exit_price: exit,
                outcome,
                realized_r_multiple: r,
                pnl_percent: pnl,
                comments,
            };
            let stored = pipeline.record_outcome(plan, &report).await?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        Commands::ApplyReview { review } => {
            let version = pipeline.apply_review(review).await?;
            println!(
                "Configuration v{} created from review {}",
                version.version, review
            );
        }
        Commands::Plans { status, limit } => {
            let plans = pipeline.journal().list_plans(status, limit).await?;
            if plans.is_empty() {
                println!("No plans");
            }
            for plan in plans {
                println!(
                    "#{:<5} {} {:<9} {} entry {:.2}-{:.2} sl {:.2} tp1 {:.2} rr {:.2} score {:.0} v{}",
                    plan.id.unwrap_or_default(),
                    plan.created_at.format("%Y-%m-%d %H:%M"),
                    plan.status,
                    plan.direction,
                    plan.levels.entry_zone_start,
                    plan.levels.entry_zone_end,
                    plan.levels.stop_loss,
                    plan.levels.tp1,
                    plan.estimated_rr,
                    plan.probability_score,
                    plan.config_version
                );
            }
        }
    }

    Ok(())
}
