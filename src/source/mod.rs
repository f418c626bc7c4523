pub mod error;
pub mod http_client;
#[cfg(test)]
pub mod mock;
pub mod yahoo;

use crate::config::ProviderConfig;
use crate::models::{FinancialTable, HistoryRange, Interval, PriceBar, StatementFrequency, Ticker};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use url::Url;

pub use self::error::SourceError;
use self::http_client::{HttpClient, is_not_found};
use self::yahoo::{
    ChartResponse, TIMESERIES_START, TimeseriesResponse, bars_from_chart, table_from_timeseries,
    timeseries_types,
};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable market-data provider.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_price_history(
        &self,
        ticker: &Ticker,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, SourceError>;

    async fn fetch_financials(
        &self,
        ticker: &Ticker,
        frequency: StatementFrequency,
    ) -> Result<FinancialTable, SourceError>;
}

// ── Yahoo Finance ─────────────────────────────────────────────────────────────

pub struct YahooSource {
    client: HttpClient,
    chart_base: Url,
    timeseries_base: Url,
}

impl YahooSource {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            chart_base: Url::parse(&config.chart_base_url)
                .with_context(|| format!("Invalid chart_base_url {}", config.chart_base_url))?,
            timeseries_base: Url::parse(&config.timeseries_base_url).with_context(|| {
                format!("Invalid timeseries_base_url {}", config.timeseries_base_url)
            })?,
        })
    }

    /// URL for a ticker's price history. e.g. AAPL → /v8/finance/chart/AAPL?range=20y&interval=1mo
    fn chart_url(
        &self,
        ticker: &Ticker,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<Url, SourceError> {
        let mut url = with_symbol(&self.chart_base, ticker)?;
        url.query_pairs_mut()
            .append_pair("range", range.as_str())
            .append_pair("interval", interval.as_str())
            .append_pair("events", "div|split");
        Ok(url)
    }

    fn timeseries_url(
        &self,
        ticker: &Ticker,
        frequency: StatementFrequency,
    ) -> Result<Url, SourceError> {
        let mut url = with_symbol(&self.timeseries_base, ticker)?;
        url.query_pairs_mut()
            .append_pair("symbol", ticker.as_str())
            .append_pair("type", &timeseries_types(frequency))
            .append_pair("period1", &TIMESERIES_START.to_string())
            .append_pair("period2", &Utc::now().timestamp().to_string());
        Ok(url)
    }
}

fn with_symbol(base: &Url, ticker: &Ticker) -> Result<Url, SourceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SourceError::Provider(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .push(ticker.as_str());
    Ok(url)
}

#[async_trait]
impl MarketDataSource for YahooSource {
    async fn fetch_price_history(
        &self,
        ticker: &Ticker,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, SourceError> {
        if ticker.is_empty() {
            return Err(SourceError::NotFound(ticker.to_string()));
        }

        let url = self.chart_url(ticker, range, interval)?;
        info!("Fetching {} price history ({} @ {})", ticker, range, interval);

        let resp = match self.client.get_json::<ChartResponse>(&url).await {
            Err(e) if is_not_found(&e) => return Err(SourceError::NotFound(ticker.to_string())),
            other => other?,
        };
        bars_from_chart(ticker, resp)
    }

    async fn fetch_financials(
        &self,
        ticker: &Ticker,
        frequency: StatementFrequency,
    ) -> Result<FinancialTable, SourceError> {
        if ticker.is_empty() {
            return Err(SourceError::NotFound(ticker.to_string()));
        }

        let url = self.timeseries_url(ticker, frequency)?;
        info!("Fetching {} {} financials", ticker, frequency.prefix());
        debug!("timeseries url: {}", url);

        let resp = match self.client.get_json::<TimeseriesResponse>(&url).await {
            Err(e) if is_not_found(&e) => return Err(SourceError::NotFound(ticker.to_string())),
            other => other?,
        };
        table_from_timeseries(ticker, frequency, resp)
    }
}
