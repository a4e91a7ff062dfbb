//! Market Sentinel
//!
//! One subcommand per scheduled job; each invocation runs once and exits.

use chrono::Utc;
use clap::{Parser, Subcommand};
use market_sentinel::{
    config::Config,
    jobs::{self, run_job, JobContext},
    mode::store::PAUSE_POLICY_KEY,
    recovery::{fmt_local, PausePolicy},
    types::Market,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "market-sentinel")]
#[command(about = "Forecast jobs gated by a news-driven risk escalation state machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan headlines, log severity events and escalate the mode
    News,
    /// Run the daily forecast for one market
    Forecast {
        /// TW or US
        #[arg(short, long)]
        market: Market,
    },
    /// Settle due predictions
    Settle,
    /// Snapshot accuracy, check the hit-rate trend and tune the horizon
    Performance,
    /// Refresh the explorer pool of one market
    Explorer {
        /// TW or US
        #[arg(short, long)]
        market: Market,
    },
    /// Recovery check: extend or lift an L4 pause, cool down L3
    Sweep,
    /// Re-derive the L4 pause length from the latest episode
    PausePolicy,
    /// Index returns after each finished L4 episode
    Impact,
    /// Forecasts before each finished L4 episode against continuing through it
    L4Compare,
    /// Show the current mode
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let ctx = JobContext::from_config(config).await?;
    let now = Utc::now();

    match cli.command {
        Commands::News => {
            let report = run_job("news", jobs::news_radar::run(&ctx, now)).await?;
            println!(
                "{}: {} watched, {} fetched, {} failed, {} logged, {} severe",
                report.market.map(|m| m.to_string()).unwrap_or_default(),
                report.watched,
                report.fetched,
                report.failed,
                report.logged,
                report.severe
            );
        }
        Commands::Forecast { market } => {
            let report = run_job("forecast", jobs::forecast::run(&ctx, market, now)).await?;
            println!(
                "{}: {:?}, {} scanned, {} failed, {} picks",
                market,
                report.decision,
                report.scanned,
                report.failures,
                report.picks.len()
            );
        }
        Commands::Settle => {
            let report = run_job("settle", jobs::settlement::run(&ctx, now)).await?;
            println!(
                "{} due, {} settled, {} failed, {} already settled",
                report.due, report.settled, report.failed, report.raced
            );
        }
        Commands::Performance => {
            let report = run_job("performance", jobs::performance::run(&ctx, now)).await?;
            for s in &report.snapshots {
                println!(
                    "{}: hit rate {:.1}% over {} samples, horizon {}d",
                    s.market,
                    s.hit_rate * 100.0,
                    s.sample_count,
                    s.horizon_days
                );
            }
        }
        Commands::Explorer { market } => {
            let report = run_job("explorer", jobs::explorer::run(&ctx, market, now)).await?;
            println!(
                "{}: {} of {} candidates with data, pool size {}{}",
                market,
                report.with_data,
                report.candidates,
                report.pool_size,
                if report.halted {
                    " (halted)"
                } else if report.suppressed {
                    " (suppressed, kept previous)"
                } else if report.kept_previous {
                    " (kept previous)"
                } else {
                    ""
                }
            );
        }
        Commands::Sweep => {
            let report = run_job("sweep", jobs::sweep::run(&ctx, now)).await?;
            println!(
                "{} -> {}",
                report.transition.before.mode, report.transition.after.mode
            );
            for review in report.reviews.iter().flatten() {
                println!(
                    "{} review: hit rate {}, avg return {} ({} samples)",
                    review.market,
                    fmt_opt_pct(review.hit_rate),
                    fmt_opt_pct(review.avg_return),
                    review.sample_count
                );
            }
        }
        Commands::PausePolicy => {
            let report = run_job("pause_policy", jobs::pause_policy::run(&ctx, now)).await?;
            println!("pause {}h ({})", report.policy.pause_hours, report.policy.reason);
        }
        Commands::Impact => {
            let report = run_job("impact", jobs::impact::run(&ctx, now)).await?;
            for (offset, mean) in &report.averages {
                match mean {
                    Some(r) => println!("T+{}: {:+.2}%", offset, r * 100.0),
                    None => println!("T+{}: n/a", offset),
                }
            }
        }
        Commands::L4Compare => {
            let report = run_job("l4_compare", jobs::l4_review::compare(&ctx, now)).await?;
            for row in &report.rows {
                println!(
                    "#{} {}: forecast mean {}, continuation {} ({} sampled)",
                    row.episode_id,
                    row.market,
                    fmt_opt_pct(row.normal_avg_pred),
                    fmt_opt_pct(row.simulated_return),
                    row.sampled
                );
            }
        }
        Commands::Status => show_status(&ctx).await?,
    }

    Ok(())
}

async fn show_status(ctx: &JobContext) -> anyhow::Result<()> {
    let now = Utc::now();
    let offset = ctx.offset();
    let record = ctx.store.current_mode(now).await?;

    println!("\n🛡 Sentinel Status\n");
    println!("Mode: {} (revision {})", record.mode, record.revision);
    println!("Since: {}", fmt_local(record.entered_at, offset));
    if let Some(until) = record.pause_until {
        println!("Paused until: {}", fmt_local(until, offset));
    }
    if let Some(until) = record.observation_until.filter(|_| record.in_observation(now)) {
        println!("Observation until: {}", fmt_local(until, offset));
    }
    if let Some(last) = record.last_severe_at {
        println!("Last L3 event: {}", fmt_local(last, offset));
    }

    if let Some(policy) = ctx.db.get_state::<PausePolicy>(PAUSE_POLICY_KEY).await? {
        println!("Pause policy: {}h ({})", policy.pause_hours, policy.reason);
    }
    if let Some(episode) = ctx.db.latest_episode().await? {
        let state = if episode.is_open() { "open" } else { "closed" };
        println!(
            "Latest L4 episode #{}: {} since {}",
            episode.id,
            state,
            fmt_local(episode.started_at, offset)
        );
    }

    Ok(())
}

fn fmt_opt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:+.2}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}
