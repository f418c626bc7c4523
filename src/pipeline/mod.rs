//! Pipeline orchestrator: ticker → fetch → select → compose.
//!
//! ## Flow
//!
//! `Pipeline::run()` makes one pass for one ticker:
//!   1. Fetch price history and the income statement concurrently
//!   2. Keep the candidate metrics the statement actually reports
//!   3. Compose the price chart, the financials chart and the news link
//!   No stage can fail the pass; a missing piece becomes a `Notice`.
//!
//! `Session` is the event loop around it. Every `InputEvent::TickerChanged`
//!   recomputes the whole dashboard. Repeat tickers are served from the
//!   fetcher's cache; `InputEvent::Refresh` empties it first.

use crate::config::AppConfig;
use crate::fetcher::{DataFetcher, EmptyReason, Fetched};
use crate::models::{FinancialTable, HistoryRange, Interval, StatementFrequency, Ticker};
use crate::selector::{CANDIDATE_METRICS, select_available_metrics};
use crate::source::{MarketDataSource, YahooSource};
use crate::utils::Timer;
use crate::view::{ChartSpec, compose_financials_chart, compose_news_link, compose_price_chart};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Which part of the page a notice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Price,
    Financials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub section: Section,
    pub message: String,
}

impl Notice {
    fn warning(section: Section, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            section,
            message: message.into(),
        }
    }

    fn error(section: Section, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            section,
            message: message.into(),
        }
    }
}

/// Everything one pass produces for one ticker.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub ticker: Ticker,
    pub statement: StatementFrequency,
    pub price_chart: Option<ChartSpec>,
    pub financials_chart: Option<ChartSpec>,
    pub news_link: Url,
    pub notices: Vec<Notice>,
}

impl Dashboard {
    pub fn notices_for(&self, section: Section) -> impl Iterator<Item = &Notice> {
        self.notices.iter().filter(move |n| n.section == section)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    fetcher: DataFetcher,
    range: HistoryRange,
    interval: Interval,
    statement: StatementFrequency,
    news_base: Url,
}

impl Pipeline {
    pub fn new(fetcher: DataFetcher, news_base: Url) -> Self {
        Self {
            fetcher,
            range: HistoryRange::default(),
            interval: Interval::default(),
            statement: StatementFrequency::default(),
            news_base,
        }
    }

    /// Yahoo-backed pipeline with the configured window and cache TTL.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source: Arc<dyn MarketDataSource> = Arc::new(
            YahooSource::new(&config.provider).context("Failed to build market-data source")?,
        );
        let fetcher = DataFetcher::new(source, Duration::from_secs(config.cache.ttl_secs));

        let news_base = Url::parse(&config.dashboard.news_base_url)
            .with_context(|| format!("Invalid news_base_url {}", config.dashboard.news_base_url))?;

        Ok(Self::new(fetcher, news_base)
            .with_window(config.dashboard.range, config.dashboard.interval)
            .with_statement(config.dashboard.statement))
    }

    pub fn with_window(mut self, range: HistoryRange, interval: Interval) -> Self {
        self.range = range;
        self.interval = interval;
        self
    }

    pub fn with_statement(mut self, statement: StatementFrequency) -> Self {
        self.statement = statement;
        self
    }

    pub async fn run(&self, ticker: &Ticker) -> Dashboard {
        let _t = Timer::start(format!("Dashboard for {}", ticker));

        let (prices, financials) = tokio::join!(
            self.fetcher.fetch_price_history(ticker, self.range, self.interval),
            self.fetch_statement(ticker),
        );

        let mut notices = Vec::new();

        // ── Price chart ───────────────────────────────────────────────────────
        let price_chart = match &prices {
            Fetched::Data(bars) => Some(compose_price_chart(ticker, bars)),
            Fetched::Empty(reason) => {
                if let EmptyReason::Failed(msg) = reason {
                    notices.push(Notice::error(
                        Section::Price,
                        format!("Error fetching stock data: {}", msg),
                    ));
                }
                notices.push(Notice::warning(
                    Section::Price,
                    "No stock data available for this company.",
                ));
                None
            }
        };

        // ── Financials chart ──────────────────────────────────────────────────
        if let Some(msg) = financials.failure() {
            notices.push(Notice::error(
                Section::Financials,
                format!("Error fetching financials: {}", msg),
            ));
        }
        let financials_chart = financials.data().and_then(|table| {
            let metrics = select_available_metrics(table, &CANDIDATE_METRICS);
            debug!("{}: plotting {:?}", ticker, metrics);
            compose_financials_chart(ticker, self.statement, table, &metrics)
        });
        if financials_chart.is_none() {
            notices.push(Notice::warning(
                Section::Financials,
                format!(
                    "No {} financial data available for the selected company.",
                    self.statement.label().to_lowercase()
                ),
            ));
        }

        let news_link = compose_news_link(&self.news_base, ticker);

        info!(
            "{}: price chart {} | financials {} | {} notices",
            ticker,
            price_chart.as_ref().map_or(0, ChartSpec::point_count),
            financials_chart
                .as_ref()
                .map_or_else(|| "none".to_string(), |c| c.series_names().join(", ")),
            notices.len()
        );

        Dashboard {
            ticker: ticker.clone(),
            statement: self.statement,
            price_chart,
            financials_chart,
            news_link,
            notices,
        }
    }

    async fn fetch_statement(&self, ticker: &Ticker) -> Fetched<FinancialTable> {
        match self.statement {
            StatementFrequency::Quarterly => self.fetcher.fetch_quarterly_financials(ticker).await,
            StatementFrequency::Annual => self.fetcher.fetch_annual_financials(ticker).await,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Raw text from the ticker input; normalised before use.
    TickerChanged(String),
    /// Drop cached answers and recompute the current ticker.
    Refresh,
}

/// Single-user session: the current ticker plus the pipeline (and its cache).
pub struct Session {
    pipeline: Pipeline,
    current: Option<Ticker>,
}

impl Session {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Ticker> {
        self.current.as_ref()
    }

    /// Recompute the dashboard for `event`. `None` only for a refresh before
    /// any ticker was entered.
    pub async fn handle(&mut self, event: InputEvent) -> Option<Dashboard> {
        self.pipeline.fetcher.purge_expired().await;

        let ticker = match event {
            InputEvent::TickerChanged(input) => {
                let ticker = Ticker::new(&input);
                if self.current.as_ref() != Some(&ticker) {
                    info!(
                        "Ticker changed: {} → {}",
                        self.current.as_ref().map_or("-", Ticker::as_str),
                        ticker
                    );
                }
                ticker
            }
            InputEvent::Refresh => {
                let ticker = self.current.clone()?;
                info!("Refreshing {}", ticker);
                self.pipeline.fetcher.invalidate().await;
                ticker
            }
        };

        let dashboard = self.pipeline.run(&ticker).await;
        self.current = Some(ticker);
        Some(dashboard)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
