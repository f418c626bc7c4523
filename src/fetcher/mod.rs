//! Data Fetcher: provider calls behind a TTL cache, with every fault turned
//! into an empty result.

use crate::cache::TtlCache;
use crate::models::{FinancialTable, HistoryRange, Interval, PriceBar, StatementFrequency, Ticker};
use crate::source::{MarketDataSource, SourceError};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a fetch: data, or the reason there is none. Provider faults
/// end up as `Empty(Failed(..))`, never as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    Empty(EmptyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    /// The provider answered, but with nothing for this ticker.
    NoData,
    /// Transport or provider fault, kept for display.
    Failed(String),
}

impl<T> Fetched<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(d) => Some(d),
            Self::Empty(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Empty(EmptyReason::Failed(msg)) => Some(msg),
            _ => None,
        }
    }
}

type PriceKey = (Ticker, HistoryRange, Interval);
type FinancialsKey = (Ticker, StatementFrequency);

/// `None` records that the provider does not know the ticker.
pub struct DataFetcher {
    source: Arc<dyn MarketDataSource>,
    prices: TtlCache<PriceKey, Option<Vec<PriceBar>>>,
    financials: TtlCache<FinancialsKey, Option<FinancialTable>>,
}

impl DataFetcher {
    pub fn new(source: Arc<dyn MarketDataSource>, ttl: Duration) -> Self {
        Self {
            source,
            prices: TtlCache::new(ttl),
            financials: TtlCache::new(ttl),
        }
    }

    pub async fn fetch_price_history(
        &self,
        ticker: &Ticker,
        range: HistoryRange,
        interval: Interval,
    ) -> Fetched<Vec<PriceBar>> {
        let key = (ticker.clone(), range, interval);
        let fetched = memoize(&self.prices, key, "stock data", || {
            self.source.fetch_price_history(ticker, range, interval)
        })
        .await;

        match fetched {
            Fetched::Data(bars) if bars.is_empty() => Fetched::Empty(EmptyReason::NoData),
            other => other,
        }
    }

    pub async fn fetch_quarterly_financials(&self, ticker: &Ticker) -> Fetched<FinancialTable> {
        self.fetch_financials(ticker, StatementFrequency::Quarterly).await
    }

    pub async fn fetch_annual_financials(&self, ticker: &Ticker) -> Fetched<FinancialTable> {
        self.fetch_financials(ticker, StatementFrequency::Annual).await
    }

    async fn fetch_financials(
        &self,
        ticker: &Ticker,
        frequency: StatementFrequency,
    ) -> Fetched<FinancialTable> {
        let key = (ticker.clone(), frequency);
        let fetched = memoize(&self.financials, key, "financials", || {
            self.source.fetch_financials(ticker, frequency)
        })
        .await;

        match fetched {
            Fetched::Data(table) if table.is_empty() => Fetched::Empty(EmptyReason::NoData),
            other => other,
        }
    }

    /// Drop every cached answer; the next fetch goes to the provider.
    pub async fn invalidate(&self) {
        self.prices.clear().await;
        self.financials.clear().await;
    }

    pub async fn purge_expired(&self) {
        let removed = self.prices.purge_expired().await + self.financials.purge_expired().await;
        if removed > 0 {
            debug!(
                "purged {} expired entries, {} still cached",
                removed,
                self.prices.len().await + self.financials.len().await
            );
        }
    }
}

/// Serve `key` from `cache`, or call `fetch` and cache the provider's answer,
/// "not found" included. Failures are logged here and never cached.
async fn memoize<K, V, F, Fut>(
    cache: &TtlCache<K, Option<V>>,
    key: K,
    what: &str,
    fetch: F,
) -> Fetched<V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, SourceError>>,
{
    if let Some(hit) = cache.get(&key).await {
        debug!("cache hit for {} {:?}", what, key);
        return match hit {
            Some(value) => Fetched::Data(value),
            None => Fetched::Empty(EmptyReason::NoData),
        };
    }

    match fetch().await {
        Ok(value) => {
            cache.insert(key, Some(value.clone())).await;
            Fetched::Data(value)
        }
        Err(SourceError::NotFound(ticker)) => {
            warn!("No {} found for `{}`", what, ticker);
            cache.insert(key, None).await;
            Fetched::Empty(EmptyReason::NoData)
        }
        Err(e) => {
            warn!("Error fetching {}: {}", what, e);
            Fetched::Empty(EmptyReason::Failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::{MockSource, monthly_bars, quarterly_table};

    fn fetcher(source: &Arc<MockSource>, ttl: Duration) -> DataFetcher {
        DataFetcher::new(Arc::clone(source) as Arc<dyn MarketDataSource>, ttl)
    }

    #[tokio::test]
    async fn test_price_history_is_cached_per_key() {
        let source = Arc::new(MockSource::new().with_prices("AAPL", monthly_bars(240)));
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let aapl = Ticker::new("AAPL");

        let first = fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;
        let second = fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;

        assert_eq!(first.data().map(Vec::len), Some(240));
        assert_eq!(first, second);
        assert_eq!(source.price_calls(), 1);

        // A different window is a different key.
        fetcher
            .fetch_price_history(&aapl, HistoryRange::FiveYears, Interval::Monthly)
            .await;
        assert_eq!(source.price_calls(), 2);
    }

    #[tokio::test]
    async fn test_financials_cached_by_ticker_and_frequency() {
        let source = Arc::new(
            MockSource::new()
                .with_quarterly("MSFT", quarterly_table(&["Total Revenue"]))
                .with_annual("MSFT", quarterly_table(&["Net Income"])),
        );
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let msft = Ticker::new("msft");

        let quarterly = fetcher.fetch_quarterly_financials(&msft).await;
        fetcher.fetch_quarterly_financials(&msft).await;
        let annual = fetcher.fetch_annual_financials(&msft).await;

        assert!(quarterly.data().unwrap().has_column("Total Revenue"));
        assert!(annual.data().unwrap().has_column("Net Income"));
        assert_eq!(source.financial_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_expiry_refetches() {
        let source = Arc::new(MockSource::new().with_prices("AAPL", monthly_bars(3)));
        let fetcher = fetcher(&source, Duration::from_millis(20));
        let aapl = Ticker::new("AAPL");

        fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;

        assert_eq!(source.price_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_empty_not_error() {
        let source = Arc::new(MockSource::new());
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let zzzz = Ticker::new("ZZZZ");

        let prices = fetcher
            .fetch_price_history(&zzzz, HistoryRange::TwentyYears, Interval::Monthly)
            .await;
        let financials = fetcher.fetch_quarterly_financials(&zzzz).await;

        assert_eq!(prices, Fetched::Empty(EmptyReason::NoData));
        assert_eq!(financials, Fetched::Empty(EmptyReason::NoData));
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_not_cached() {
        let source = Arc::new(MockSource::new().failing("AAPL", "connection reset"));
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let aapl = Ticker::new("AAPL");

        for _ in 0..2 {
            let prices = fetcher
                .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
                .await;
            assert!(prices.data().is_none());
            assert_eq!(prices.failure(), Some("provider error: connection reset"));
        }
        assert_eq!(source.price_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_cached() {
        let source = Arc::new(MockSource::new());
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let zzzz = Ticker::new("ZZZZ");

        for _ in 0..3 {
            let prices = fetcher
                .fetch_price_history(&zzzz, HistoryRange::TwentyYears, Interval::Monthly)
                .await;
            assert_eq!(prices, Fetched::Empty(EmptyReason::NoData));
        }
        assert_eq!(source.price_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_series_is_cached_as_no_data() {
        let source = Arc::new(MockSource::new().with_prices("SPAC", vec![]));
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let spac = Ticker::new("SPAC");

        for _ in 0..2 {
            let prices = fetcher
                .fetch_price_history(&spac, HistoryRange::TwentyYears, Interval::Monthly)
                .await;
            assert_eq!(prices, Fetched::Empty(EmptyReason::NoData));
        }
        assert_eq!(source.price_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(MockSource::new().with_quarterly("AAPL", quarterly_table(&["Net Income"])));
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let aapl = Ticker::new("AAPL");

        fetcher.fetch_quarterly_financials(&aapl).await;
        fetcher.invalidate().await;
        fetcher.fetch_quarterly_financials(&aapl).await;

        assert_eq!(source.financial_calls(), 2);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_entries() {
        let source = Arc::new(MockSource::new().with_prices("AAPL", monthly_bars(3)));
        let fetcher = fetcher(&source, Duration::from_secs(3600));
        let aapl = Ticker::new("AAPL");

        fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;
        fetcher.purge_expired().await;
        fetcher
            .fetch_price_history(&aapl, HistoryRange::TwentyYears, Interval::Monthly)
            .await;

        assert_eq!(source.price_calls(), 1);
    }
}
