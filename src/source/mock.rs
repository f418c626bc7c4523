//! In-memory provider for tests; counts every call it receives. Also a
//! canned-response HTTP server for exercising the real client.

use super::{MarketDataSource, SourceError};
use crate::models::{FinancialTable, HistoryRange, Interval, PriceBar, StatementFrequency, Ticker};
use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

#[derive(Default)]
pub struct MockSource {
    prices: HashMap<String, Vec<PriceBar>>,
    financials: HashMap<(String, &'static str), FinancialTable>,
    failing: HashMap<String, String>,
    price_calls: AtomicUsize,
    financial_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.prices.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_quarterly(mut self, ticker: &str, table: FinancialTable) -> Self {
        self.financials.insert((ticker.to_string(), "quarterly"), table);
        self
    }

    pub fn with_annual(mut self, ticker: &str, table: FinancialTable) -> Self {
        self.financials.insert((ticker.to_string(), "annual"), table);
        self
    }

    /// Every request for `ticker` fails with a provider error.
    pub fn failing(mut self, ticker: &str, message: &str) -> Self {
        self.failing.insert(ticker.to_string(), message.to_string());
        self
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn financial_calls(&self) -> usize {
        self.financial_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self, ticker: &Ticker) -> Result<(), SourceError> {
        match self.failing.get(ticker.as_str()) {
            Some(message) => Err(SourceError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    async fn fetch_price_history(
        &self,
        ticker: &Ticker,
        _range: HistoryRange,
        _interval: Interval,
    ) -> Result<Vec<PriceBar>, SourceError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(ticker)?;
        self.prices
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(ticker.to_string()))
    }

    async fn fetch_financials(
        &self,
        ticker: &Ticker,
        frequency: StatementFrequency,
    ) -> Result<FinancialTable, SourceError> {
        self.financial_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(ticker)?;
        Ok(self
            .financials
            .get(&(ticker.to_string(), frequency.prefix()))
            .cloned()
            .unwrap_or_default())
    }
}

/// `n` consecutive month-start bars ending at 2024-12-01.
pub fn monthly_bars(n: usize) -> Vec<PriceBar> {
    let end = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    (0..n)
        .rev()
        .map(|back| {
            let date = end - Months::new(back as u32);
            let close = 10.0 + (n - back) as f64;
            PriceBar {
                date,
                open: Some(close - 0.5),
                high: Some(close + 1.0),
                low: Some(close - 1.0),
                close,
                volume: Some(1_000_000),
            }
        })
        .collect()
}

/// Four quarters of the given metrics, values scaled by column position.
pub fn quarterly_table(metrics: &[&str]) -> FinancialTable {
    let quarters = [(2024, 3, 31), (2024, 6, 30), (2024, 9, 30), (2024, 12, 31)];
    let mut table = FinancialTable::new();
    table.set_currency("USD");
    for (q, (y, m, d)) in quarters.into_iter().enumerate() {
        let period = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        for (i, metric) in metrics.iter().enumerate() {
            table.insert(period, *metric, 1e9 * (i + 1) as f64 + 1e8 * q as f64);
        }
    }
    table
}

/// Raw HTTP/1.1 response with a JSON body; the connection closes after it.
pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Local server answering one connection per canned response, in order.
/// Returns its base URL and a counter of requests served.
pub async fn serve_http(responses: Vec<String>) -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let served = Arc::clone(&hits);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await;
            served.fetch_add(1, Ordering::SeqCst);
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (Url::parse(&format!("http://{}/", addr)).unwrap(), hits)
}
