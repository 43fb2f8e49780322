use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use earnings_desk::service::analysis::AnalysisEvent;
use earnings_desk::service::calendar::today_eastern;
use earnings_desk::service::news::DEFAULT_NEWS_DAYS;
use earnings_desk::{AppContext, Settings};

#[derive(Parser)]
#[command(name = "earnings-desk", about = "Earnings calendar and analysis", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Earnings for the trading week containing a date (default: today, US/Eastern)
    Week {
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Every stored report date for one ticker, refreshed from the symbol feed
    Search { ticker: String },
    /// Largest reporters of last week and this week
    Highlights,
    /// Recent daily closes for a ticker
    Sparkline { ticker: String },
    /// Run an analysis, printing each progress event as a JSON line
    Analyze { ticker: String, quarter: String },
    /// Latest stored analysis for a ticker
    Analysis { ticker: String },
    /// Recent headlines for a ticker
    News {
        ticker: String,
        /// Lookback window in days
        #[arg(short, long, default_value_t = DEFAULT_NEWS_DAYS, value_parser = clap::value_parser!(u32).range(1..=90))]
        days: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("earnings_desk=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    info!("Starting with {:?}", settings);
    let ctx = AppContext::open(settings)
        .await
        .context("failed to initialize earnings desk")?;

    let outcome = run(&ctx, cli.command).await;
    ctx.close().await;
    outcome
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Week { date } => {
            let anchor = date.unwrap_or_else(today_eastern);
            let events = ctx.calendar.get_week_earnings(anchor).await?;
            print_json(&events)
        }
        Command::Search { ticker } => {
            let events = ctx.calendar.search_ticker(&ticker).await?;
            print_json(&events)
        }
        Command::Highlights => print_json(&ctx.calendar.highlights().await?),
        Command::Sparkline { ticker } => print_json(&ctx.calendar.sparkline(&ticker).await),
        Command::Analyze { ticker, quarter } => {
            let mut events = ctx.analysis.run_analysis_streaming(&ticker, &quarter);
            let mut failed = None;
            while let Some(event) = events.recv().await {
                println!("{}", serde_json::to_string(&event)?);
                if let AnalysisEvent::Error { phase, message } = &event {
                    failed = Some(format!("analysis failed during {phase}: {message}"));
                }
            }
            match failed {
                Some(reason) => anyhow::bail!(reason),
                None => Ok(()),
            }
        }
        Command::Analysis { ticker } => match ctx.analysis.get_cached_analysis(&ticker).await? {
            Some(analysis) => print_json(&analysis),
            None => {
                println!("null");
                Ok(())
            }
        },
        Command::News { ticker, days } => print_json(&ctx.news.news(&ticker, days).await),
    }
}
