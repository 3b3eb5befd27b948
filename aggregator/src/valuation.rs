use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use domain::{Chain, PortfolioSnapshot, PriceQuote, RawBalance, ValuedAsset};
use ethers::{types::U256, utils::format_units};

/// `raw_amount / 10^decimals` using 256-bit integer formatting so 18+ decimal
/// tokens keep their precision until the final `f64` parse. Malformed amounts
/// and decimals above what a `U256` can hold become 0.
pub fn decimal_amount(raw_amount: &str, decimals: u8) -> f64 {
    let Ok(raw) = U256::from_dec_str(raw_amount.trim()) else {
        return 0.0;
    };
    match format_units(raw, decimals as u32) {
        Ok(formatted) => formatted
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .unwrap_or(0.0),
        Err(_) => 0.0,
    }
}

struct Holding {
    name: String,
    decimal_balance: f64,
    chains: BTreeSet<Chain>,
}

pub fn normalize(balances: &[RawBalance], prices: &HashMap<String, PriceQuote>) -> PortfolioSnapshot {
    normalize_at(balances, prices, Utc::now())
}

pub fn normalize_at(
    balances: &[RawBalance],
    prices: &HashMap<String, PriceQuote>,
    generated_at: DateTime<Utc>,
) -> PortfolioSnapshot {
    // 同 symbol 跨鏈合併，key 一律大寫
    let mut holdings: BTreeMap<String, Holding> = BTreeMap::new();
    for balance in balances {
        let symbol = balance.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        let amount = decimal_amount(&balance.raw_amount, balance.decimals);
        let holding = holdings.entry(symbol).or_insert_with(|| Holding {
            name: balance.name.clone(),
            decimal_balance: 0.0,
            chains: BTreeSet::new(),
        });
        holding.decimal_balance += amount;
        holding.chains.insert(balance.chain);
    }

    let mut assets: Vec<ValuedAsset> = holdings
        .into_iter()
        .filter(|(_, holding)| holding.decimal_balance > 0.0)
        .map(|(symbol, holding)| {
            let (usd_price, change_24h_percent) = prices
                .get(&symbol)
                .map(|quote| (clamp_price(quote.usd_price), clamp_change(quote.change_24h_percent)))
                .unwrap_or((0.0, 0.0));
            // 極端餘額乘價格可能溢位成 inf，視同無法估值
            let usd_value = Some(holding.decimal_balance * usd_price)
                .filter(|value| value.is_finite())
                .unwrap_or(0.0);
            ValuedAsset {
                usd_value,
                symbol,
                name: holding.name,
                decimal_balance: holding.decimal_balance,
                usd_price,
                change_24h_percent,
                allocation_percent: 0.0,
                chains: holding.chains,
            }
        })
        .collect();

    let total_usd_value: f64 = assets.iter().map(|asset| asset.usd_value).sum();
    let valued = total_usd_value > 0.0 && total_usd_value.is_finite();
    if valued {
        for asset in &mut assets {
            asset.allocation_percent = asset.usd_value / total_usd_value * 100.0;
        }
    }

    // 以今日漲跌幅推回昨日價值，只是近似值
    let daily_change_usd: f64 = if valued {
        assets
            .iter()
            .map(|asset| asset.usd_value * asset.change_24h_percent / 100.0)
            .sum()
    } else {
        0.0
    };
    let previous_value = total_usd_value - daily_change_usd;
    let daily_change_percent = if valued && previous_value.abs() > f64::EPSILON {
        daily_change_usd / previous_value * 100.0
    } else {
        0.0
    };

    assets.sort_by(|a, b| {
        b.usd_value
            .total_cmp(&a.usd_value)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    PortfolioSnapshot {
        total_usd_value,
        daily_change_usd,
        daily_change_percent,
        assets,
        generated_at,
    }
}

fn clamp_price(price: f64) -> f64 {
    if price.is_finite() && price > 0.0 {
        price
    } else {
        0.0
    }
}

fn clamp_change(change: f64) -> f64 {
    if change.is_finite() {
        change
    } else {
        0.0
    }
}
