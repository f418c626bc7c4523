use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Ticker ────────────────────────────────────────────────────────────────────

/// Free-text ticker input, trimmed and upper-cased.
///
/// Not checked against any symbol list: an empty or unknown ticker is still a
/// valid value and simply yields no data downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(input: &str) -> Self {
        Self(normalise_symbol(input))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

// ── Price bar ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
}

// ── Request windows ───────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported {kind} `{value}` (expected one of: {expected})")]
pub struct ParseTokenError {
    kind: &'static str,
    value: String,
    expected: String,
}

/// Lookback window for the price history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[default]
    #[serde(rename = "20y")]
    TwentyYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl HistoryRange {
    pub const ALL: [HistoryRange; 12] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::TwoYears,
        Self::FiveYears,
        Self::TenYears,
        Self::TwentyYears,
        Self::YearToDate,
        Self::Max,
    ];

    /// Provider token, e.g. `20y`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::TwentyYears => "20y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseTokenError {
                kind: "range",
                value: s,
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

/// Sampling granularity of the price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[default]
    #[serde(rename = "1mo")]
    Monthly,
    #[serde(rename = "3mo")]
    Quarterly,
}

impl Interval {
    pub const ALL: [Interval; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Quarterly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
            Self::Quarterly => "3mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| ParseTokenError {
                kind: "interval",
                value: s,
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFrequency {
    #[default]
    Quarterly,
    Annual,
}

impl StatementFrequency {
    pub fn label(self) -> &'static str {
        match self {
            Self::Quarterly => "Quarterly",
            Self::Annual => "Annual",
        }
    }

    /// Key prefix used by the fundamentals timeseries endpoint.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }
}

// ── Financial statement table ─────────────────────────────────────────────────

/// Statement line items: rows are reporting periods, columns are metric names.
///
/// Which metrics exist depends on the company; a column is present when at
/// least one period reports a value for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialTable {
    rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
    currency: Option<String>,
}

impl FinancialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.currency = Some(currency.into());
    }

    pub fn insert(&mut self, period: NaiveDate, metric: impl Into<String>, value: f64) {
        self.rows.entry(period).or_default().insert(metric.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Reporting periods, oldest first.
    pub fn periods(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn has_column(&self, metric: &str) -> bool {
        self.rows.values().any(|row| row.contains_key(metric))
    }

    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// One cell per period; `None` where the period has no value for `metric`.
    pub fn column(&self, metric: &str) -> Vec<(NaiveDate, Option<f64>)> {
        self.rows
            .iter()
            .map(|(period, row)| (*period, row.get(metric).copied()))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
