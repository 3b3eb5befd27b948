use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use domain::{PriceQuote, PriceSource};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{error::PortfolioError, provider::PriceProvider};

/// Static USD prices consulted once when the live provider fails.
#[derive(Debug, Clone)]
pub struct FallbackPriceTable {
    quotes: HashMap<String, PriceQuote>,
}

impl Default for FallbackPriceTable {
    fn default() -> Self {
        let entries = [
            ("ETH", 2600.0, 1.5),
            ("BTC", 43000.0, 2.1),
            ("BTCB", 43000.0, 2.1),
            ("USDC", 1.0, 0.0),
            ("USDT", 1.0, 0.0),
            ("UNI", 6.75, 0.9),
            ("LINK", 15.20, 3.2),
            ("AAVE", 95.40, -1.2),
            ("MATIC", 0.85, -0.5),
        ];
        let quotes = entries
            .into_iter()
            .map(|(symbol, usd_price, change_24h_percent)| {
                (
                    symbol.to_string(),
                    PriceQuote {
                        symbol: symbol.to_string(),
                        usd_price,
                        change_24h_percent,
                    },
                )
            })
            .collect();
        Self { quotes }
    }
}

impl FallbackPriceTable {
    /// Overrides set only the price; a 24h change already in the table is kept.
    pub fn with_overrides(mut self, prices: &HashMap<String, f64>) -> Self {
        for (symbol, price) in prices {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() || !price.is_finite() || *price < 0.0 {
                continue;
            }
            let entry = self
                .quotes
                .entry(symbol.clone())
                .or_insert_with(|| PriceQuote {
                    symbol,
                    usd_price: 0.0,
                    change_24h_percent: 0.0,
                });
            entry.usd_price = *price;
        }
        self
    }

    pub fn lookup(&self, symbols: &BTreeSet<String>) -> HashMap<String, PriceQuote> {
        symbols
            .iter()
            .filter_map(|symbol| {
                self.quotes
                    .get(symbol)
                    .map(|quote| (symbol.clone(), quote.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceFetch {
    pub quotes: HashMap<String, PriceQuote>,
    pub source: PriceSource,
}

/// Trims, uppercases and deduplicates symbols. Blank entries are dropped.
pub fn normalize_symbols<I, S>(symbols: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    symbols
        .into_iter()
        .filter_map(|symbol| {
            let trimmed = symbol.as_ref().trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_uppercase())
            }
        })
        .collect()
}

/// One batched call to `primary`; on failure or timeout the fallback table is
/// consulted once. No retries.
pub async fn fetch_prices<I, S>(
    primary: &dyn PriceProvider,
    fallback: &FallbackPriceTable,
    symbols: I,
    call_timeout: Duration,
) -> PriceFetch
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let symbols = normalize_symbols(symbols);
    if symbols.is_empty() {
        return PriceFetch {
            quotes: HashMap::new(),
            source: PriceSource::None,
        };
    }

    let outcome = match timeout(call_timeout, primary.get_prices(&symbols)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "timed out after {}ms",
            call_timeout.as_millis()
        )),
    };

    match outcome {
        Ok(quotes) => {
            let quotes: HashMap<String, PriceQuote> = quotes
                .into_iter()
                .map(|(symbol, quote)| (symbol.to_uppercase(), quote))
                .filter(|(symbol, _)| symbols.contains(symbol))
                .collect();
            info!(
                requested = symbols.len(),
                priced = quotes.len(),
                "live prices fetched"
            );
            PriceFetch {
                quotes,
                source: PriceSource::Live,
            }
        }
        Err(err) => {
            let err = PortfolioError::PriceProviderUnavailable(format!("{err:#}"));
            let quotes = fallback.lookup(&symbols);
            warn!(
                error = %err,
                requested = symbols.len(),
                priced = quotes.len(),
                "using fallback price table"
            );
            PriceFetch {
                quotes,
                source: PriceSource::Fallback,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;

    pub struct StubPrices {
        pub quotes: HashMap<String, (f64, f64)>,
        pub fail: bool,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<BTreeSet<String>>>,
    }

    impl StubPrices {
        pub fn new(quotes: &[(&str, f64, f64)]) -> Self {
            Self {
                quotes: quotes
                    .iter()
                    .map(|(s, p, c)| (s.to_string(), (*p, *c)))
                    .collect(),
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }
    }

    #[async_trait]
    impl PriceProvider for StubPrices {
        async fn get_prices(
            &self,
            symbols: &BTreeSet<String>,
        ) -> Result<HashMap<String, PriceQuote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(symbols.clone());
            if self.fail {
                anyhow::bail!("coingecko returned status 429 Too Many Requests");
            }
            Ok(symbols
                .iter()
                .filter_map(|symbol| {
                    self.quotes.get(symbol).map(|(price, change)| {
                        (
                            symbol.clone(),
                            PriceQuote {
                                symbol: symbol.clone(),
                                usd_price: *price,
                                change_24h_percent: *change,
                            },
                        )
                    })
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn symbols_are_deduplicated_into_one_call() {
        let provider = StubPrices::new(&[("USDC", 1.0, 0.0), ("ETH", 2500.0, 4.0)]);
        let fetch = fetch_prices(
            &provider,
            &FallbackPriceTable::default(),
            ["usdc", "USDC", " eth ", "USDC", ""],
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let seen = provider.seen.lock().unwrap();
        assert_eq!(
            seen[0].iter().cloned().collect::<Vec<_>>(),
            vec!["ETH".to_string(), "USDC".to_string()]
        );
        assert_eq!(fetch.source, PriceSource::Live);
        assert_eq!(fetch.quotes["ETH"].usd_price, 2500.0);
    }

    #[tokio::test]
    async fn unmapped_symbols_are_omitted() {
        let provider = StubPrices::new(&[("ETH", 2500.0, 4.0)]);
        let fetch = fetch_prices(
            &provider,
            &FallbackPriceTable::default(),
            ["ETH", "SCAMCOIN"],
            Duration::from_secs(5),
        )
        .await;
        assert!(fetch.quotes.contains_key("ETH"));
        assert!(!fetch.quotes.contains_key("SCAMCOIN"));
    }

    #[tokio::test]
    async fn failure_falls_back_to_table_once() {
        let provider = StubPrices::failing();
        let fetch = fetch_prices(
            &provider,
            &FallbackPriceTable::default(),
            ["ETH", "USDC", "PEPE"],
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetch.source, PriceSource::Fallback);
        assert_eq!(fetch.quotes["ETH"].usd_price, 2600.0);
        assert_eq!(fetch.quotes["USDC"].usd_price, 1.0);
        assert!(!fetch.quotes.contains_key("PEPE"));
    }

    #[tokio::test]
    async fn empty_symbol_set_skips_provider() {
        let provider = StubPrices::new(&[]);
        let fetch = fetch_prices(
            &provider,
            &FallbackPriceTable::default(),
            Vec::<String>::new(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetch.source, PriceSource::None);
        assert!(fetch.quotes.is_empty());
    }

    #[test]
    fn overrides_replace_price_and_add_symbols() {
        let overrides = HashMap::from([
            ("eth".to_string(), 3000.0),
            ("ARB".to_string(), 1.1),
            ("BAD".to_string(), f64::NAN),
        ]);
        let table = FallbackPriceTable::default().with_overrides(&overrides);
        let quotes = table.lookup(&normalize_symbols(["ETH", "ARB", "BAD"]));
        assert_eq!(quotes["ETH"].usd_price, 3000.0);
        assert_eq!(quotes["ETH"].change_24h_percent, 1.5);
        assert_eq!(quotes["ARB"].usd_price, 1.1);
        assert!(!quotes.contains_key("BAD"));
    }
}
