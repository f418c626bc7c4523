//! View Composer: turns fetched data into rendering-agnostic chart specs.
//!
//! Nothing here knows about Plotly or HTML; see [`html`] for that.

pub mod html;

use crate::models::{FinancialTable, PriceBar, StatementFrequency, Ticker};
use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

// ── Chart specs ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Single series over time.
    Line,
    /// One bar per series at each x, side by side.
    GroupedBar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

/// `y` is `None` where the period has no reported value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: NaiveDate,
    pub y: Option<f64>,
}

impl ChartSpec {
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    pub fn series_names(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.name.as_str()).collect()
    }
}

// ── Composers ─────────────────────────────────────────────────────────────────

/// Closing price over time. Callers skip this for an empty series and show a
/// notice instead.
pub fn compose_price_chart(ticker: &Ticker, bars: &[PriceBar]) -> ChartSpec {
    ChartSpec {
        kind: ChartKind::Line,
        title: format!("{} Stock Price", ticker),
        x_label: "Date".to_string(),
        y_label: "Price (USD)".to_string(),
        series: vec![Series {
            name: "Close".to_string(),
            points: bars
                .iter()
                .map(|bar| Point {
                    x: bar.date,
                    y: Some(bar.close),
                })
                .collect(),
        }],
    }
}

/// Grouped bars, one series per metric in `metrics` order; `None` when there
/// is nothing to plot.
pub fn compose_financials_chart(
    ticker: &Ticker,
    frequency: StatementFrequency,
    table: &FinancialTable,
    metrics: &[String],
) -> Option<ChartSpec> {
    if metrics.is_empty() {
        return None;
    }

    let series = metrics
        .iter()
        .map(|metric| Series {
            name: metric.clone(),
            points: table
                .column(metric)
                .into_iter()
                .map(|(period, value)| Point { x: period, y: value })
                .collect(),
        })
        .collect();

    Some(ChartSpec {
        kind: ChartKind::GroupedBar,
        title: format!("{} {} Financials", ticker, frequency.label()),
        x_label: "Date".to_string(),
        y_label: table.currency().unwrap_or("USD").to_string(),
        series,
    })
}

/// `{base}?query={TICKER}`, URL-encoded. No request is made.
pub fn compose_news_link(base: &Url, ticker: &Ticker) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("query", ticker.as_str());
    url
}
