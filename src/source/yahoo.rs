//! Yahoo Finance chart and fundamentals-timeseries responses.
//!
//! Parsing is kept free of I/O so the conversions can be checked against
//! captured payloads.

use crate::models::{FinancialTable, PriceBar, StatementFrequency, Ticker};
use crate::source::error::SourceError;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Income-statement line items requested from the timeseries endpoint,
/// as (endpoint key, display name).
pub const INCOME_STATEMENT_ITEMS: &[(&str, &str)] = &[
    ("TotalRevenue", "Total Revenue"),
    ("CostOfRevenue", "Cost Of Revenue"),
    ("GrossProfit", "Gross Profit"),
    ("OperatingExpense", "Operating Expense"),
    ("OperatingIncome", "Operating Income"),
    ("PretaxIncome", "Pretax Income"),
    ("TaxProvision", "Tax Provision"),
    ("NetIncome", "Net Income"),
    ("EBITDA", "EBITDA"),
    ("BasicEPS", "Basic EPS"),
    ("DilutedEPS", "Diluted EPS"),
];

/// Earliest period requested; older statements are not published anyway.
pub const TIMESERIES_START: i64 = 493_590_046;

// ── Chart endpoint ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ProviderMessage>,
}

#[derive(Debug, Deserialize)]
struct ProviderMessage {
    code: Option<String>,
    description: Option<String>,
}

impl ProviderMessage {
    fn into_error(self, ticker: &Ticker) -> SourceError {
        let description = self.description.unwrap_or_default();
        match self.code.as_deref() {
            Some("Not Found") => SourceError::NotFound(ticker.to_string()),
            Some(code) => SourceError::Provider(format!("{}: {}", code, description)),
            None => SourceError::Provider(description),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Convert a chart payload into chronological bars.
///
/// Periods without a close are dropped; a trailing in-progress period that
/// repeats the previous date is collapsed into it.
pub fn bars_from_chart(ticker: &Ticker, resp: ChartResponse) -> Result<Vec<PriceBar>, SourceError> {
    if let Some(err) = resp.chart.error {
        return Err(err.into_error(ticker));
    }

    let Some(result) = resp.chart.result.and_then(|mut r| r.pop()) else {
        return Err(SourceError::NotFound(ticker.to_string()));
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let cell = |col: &Vec<Option<f64>>, i: usize| col.get(i).copied().flatten();

    let mut bars: Vec<PriceBar> = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = cell(&quote.close, i) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            warn!("{}: skipping out-of-range timestamp {}", ticker, ts);
            continue;
        };

        let bar = PriceBar {
            date,
            open: cell(&quote.open, i),
            high: cell(&quote.high, i),
            low: cell(&quote.low, i),
            close,
            volume: quote.volume.get(i).copied().flatten(),
        };

        match bars.last_mut() {
            Some(last) if last.date >= bar.date => *last = bar,
            _ => bars.push(bar),
        }
    }

    debug!("{}: {} price bars decoded", ticker, bars.len());
    Ok(bars)
}

// ── Fundamentals timeseries endpoint ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TimeseriesResponse {
    timeseries: TimeseriesBody,
}

#[derive(Debug, Deserialize)]
struct TimeseriesBody {
    result: Option<Vec<TimeseriesResult>>,
    error: Option<ProviderMessage>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    meta: TimeseriesMeta,
    /// The series itself lives under a key named after its type.
    #[serde(flatten)]
    series: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesMeta {
    #[serde(rename = "type", default)]
    kind: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportedPoint {
    as_of_date: NaiveDate,
    currency_code: Option<String>,
    reported_value: Option<ReportedValue>,
}

#[derive(Debug, Deserialize)]
struct ReportedValue {
    raw: Option<f64>,
}

/// Comma-separated `type` parameter, e.g. `quarterlyTotalRevenue,quarterlyGrossProfit,…`.
pub fn timeseries_types(frequency: StatementFrequency) -> String {
    INCOME_STATEMENT_ITEMS
        .iter()
        .map(|(key, _)| format!("{}{}", frequency.prefix(), key))
        .collect::<Vec<_>>()
        .join(",")
}

fn display_name(frequency: StatementFrequency, kind: &str) -> Option<&'static str> {
    let key = kind.strip_prefix(frequency.prefix())?;
    INCOME_STATEMENT_ITEMS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

/// Pivot the per-metric series into a period × metric table.
pub fn table_from_timeseries(
    ticker: &Ticker,
    frequency: StatementFrequency,
    resp: TimeseriesResponse,
) -> Result<FinancialTable, SourceError> {
    if let Some(err) = resp.timeseries.error {
        return Err(err.into_error(ticker));
    }

    let mut table = FinancialTable::new();

    for mut result in resp.timeseries.result.unwrap_or_default() {
        for kind in &result.meta.kind {
            let Some(name) = display_name(frequency, kind) else {
                debug!("{}: ignoring unrequested series {}", ticker, kind);
                continue;
            };
            let Some(raw) = result.series.remove(kind) else {
                continue;
            };
            let points: Vec<Option<ReportedPoint>> =
                serde_json::from_value(raw).map_err(|e| SourceError::Decode {
                    url: format!("timeseries/{}", ticker),
                    message: format!("{}: {}", kind, e),
                })?;

            for point in points.into_iter().flatten() {
                let Some(value) = point.reported_value.and_then(|v| v.raw) else {
                    continue;
                };
                if table.currency().is_none() {
                    if let Some(ccy) = point.currency_code {
                        table.set_currency(ccy);
                    }
                }
                table.insert(point.as_of_date, name, value);
            }
        }
    }

    debug!(
        "{}: {} {} periods, columns {:?}",
        ticker,
        table.periods().count(),
        frequency.prefix(),
        table.columns()
    );
    Ok(table)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
