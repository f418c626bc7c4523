mod cache;
mod config;
mod fetcher;
mod models;
mod pipeline;
mod selector;
mod source;
mod utils;
mod view;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use crate::config::AppConfig;
use crate::models::{HistoryRange, Interval, StatementFrequency, Ticker};
use crate::pipeline::{Dashboard, InputEvent, NoticeLevel, Pipeline, Session};
use crate::view::{ChartSpec, compose_news_link, html};

#[derive(Parser)]
#[command(
    name = "ticker-dashboard",
    about = "Price history, financials and news link for a stock ticker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Build the dashboard for one ticker and write it as an HTML page
    Show {
        /// Ticker symbol (default: dashboard.default_ticker)
        ticker: Option<String>,

        /// Output HTML file (default: dashboard.output)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the dashboard as JSON instead of writing HTML
        #[arg(long)]
        json: bool,

        /// Price history lookback, e.g. 5y, 20y, max
        #[arg(long)]
        range: Option<HistoryRange>,

        /// Price sampling interval: 1d, 1wk, 1mo, 3mo
        #[arg(long)]
        interval: Option<Interval>,

        /// Plot the annual statement instead of the quarterly one
        #[arg(long)]
        annual: bool,
    },

    /// Read tickers from stdin, one per line, re-rendering the page each time
    Watch {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the news search link for a ticker
    News { ticker: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ticker_dashboard=info,warn",
        1 => "ticker_dashboard=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Show {
            ticker,
            out,
            json,
            range,
            interval,
            annual,
        } => {
            let statement = if annual {
                StatementFrequency::Annual
            } else {
                config.dashboard.statement
            };
            let pipeline = Pipeline::from_config(&config)?
                .with_window(
                    range.unwrap_or(config.dashboard.range),
                    interval.unwrap_or(config.dashboard.interval),
                )
                .with_statement(statement);

            let ticker = Ticker::new(ticker.as_deref().unwrap_or(&config.dashboard.default_ticker));
            let dashboard = pipeline.run(&ticker).await;

            if json {
                let out = serde_json::to_string_pretty(&dashboard)
                    .context("Failed to serialise dashboard")?;
                println!("{}", out);
            } else {
                let out = out.unwrap_or_else(|| config.dashboard.output.clone());
                html::write_page(&dashboard, &out)?;
                print_summary(&dashboard, &out);
            }
        }

        Command::Watch { out } => {
            let out = out.unwrap_or_else(|| config.dashboard.output.clone());
            let mut session = Session::new(Pipeline::from_config(&config)?);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            println!("Enter a ticker per line (`:refresh` reloads, Ctrl-D quits).");
            while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
                let event = match line.trim() {
                    ":refresh" => InputEvent::Refresh,
                    _ => InputEvent::TickerChanged(line),
                };
                match session.handle(event).await {
                    Some(dashboard) => {
                        html::write_page(&dashboard, &out)?;
                        print_summary(&dashboard, &out);
                    }
                    None => println!("Nothing to refresh yet; enter a ticker first."),
                }
            }
            info!(
                "Session ended (last ticker: {})",
                session.current().map_or("-", Ticker::as_str)
            );
        }

        Command::News { ticker } => {
            let base = Url::parse(&config.dashboard.news_base_url).with_context(|| {
                format!("Invalid news_base_url {}", config.dashboard.news_base_url)
            })?;
            println!("{}", compose_news_link(&base, &Ticker::new(&ticker)));
        }
    }

    Ok(())
}

fn print_summary(dashboard: &Dashboard, out: &Path) {
    println!("─────────────────────────────────");
    println!("  {} · Company Financial Dashboard", dashboard.ticker);
    println!("─────────────────────────────────");
    match &dashboard.price_chart {
        Some(chart) => println!("  Price      : {}", describe_price(chart)),
        None => println!("  Price      : —"),
    }
    match &dashboard.financials_chart {
        Some(chart) => {
            println!("  {:<11}:", dashboard.statement.label());
            for (name, latest) in latest_values(chart) {
                println!("    {:<18} {}", name, latest);
            }
        }
        None => println!("  {:<11}: —", dashboard.statement.label()),
    }
    println!("  News       : {}", dashboard.news_link);
    println!("  Page       : {}", out.display());
    for notice in &dashboard.notices {
        let marker = match notice.level {
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        println!("  [{}] {}", marker, notice.message);
    }
    println!("─────────────────────────────────");
}

fn describe_price(chart: &ChartSpec) -> String {
    let points = chart.series.first().map(|s| s.points.as_slice()).unwrap_or_default();
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => format!(
            "{} closes, {} → {}, last {}",
            points.len(),
            first.x,
            last.x,
            last.y.map_or_else(|| "—".to_string(), |y| format!("{:.2}", y))
        ),
        _ => "—".to_string(),
    }
}

/// Most recent reported value per series.
fn latest_values(chart: &ChartSpec) -> Vec<(&str, String)> {
    chart
        .series
        .iter()
        .map(|series| {
            let latest = series
                .points
                .iter()
                .rev()
                .find_map(|p| p.y.map(|y| format!("{} ({})", utils::fmt_amount(y), p.x)))
                .unwrap_or_else(|| "—".to_string());
            (series.name.as_str(), latest)
        })
        .collect()
}
