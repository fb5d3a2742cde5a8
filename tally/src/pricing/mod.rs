use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tally_instrument::unit::UnitSymbol;

/// Black-Scholes helpers consumed by the delta-hedge contract.
pub mod bs;

/// Prices for a set of units at a single instant, denominated in the source's base
/// currency.
pub type PriceMap = BTreeMap<UnitSymbol, Decimal>;

/// A read-only map from `(unit, time)` to a price in a base currency.
///
/// The base currency always prices at 1.
pub trait PricingSource {
    fn base_currency(&self) -> &UnitSymbol;

    /// Price of a single unit at the provided timestamp, if known.
    fn get_price(&self, unit: &UnitSymbol, timestamp: DateTime<Utc>) -> Option<Decimal>;

    /// Prices for multiple units at the provided timestamp; unknown units are omitted.
    fn get_prices(&self, units: &BTreeSet<UnitSymbol>, timestamp: DateTime<Utc>) -> PriceMap {
        units
            .iter()
            .filter_map(|unit| {
                self.get_price(unit, timestamp)
                    .map(|price| (unit.clone(), price))
            })
            .collect()
    }
}

/// Time-independent prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPrices {
    base_currency: UnitSymbol,
    prices: PriceMap,
}

impl StaticPrices {
    /// Construct a new [`Self`]; the base currency is pinned to a price of 1.
    pub fn new<Symbol>(prices: PriceMap, base_currency: Symbol) -> Self
    where
        Symbol: Into<UnitSymbol>,
    {
        let base_currency = base_currency.into();
        let mut prices = prices;
        prices.insert(base_currency.clone(), Decimal::ONE);
        Self {
            base_currency,
            prices,
        }
    }

    pub fn update_price<Symbol>(&mut self, unit: Symbol, price: Decimal)
    where
        Symbol: Into<UnitSymbol>,
    {
        self.prices.insert(unit.into(), price);
    }

    pub fn update_prices(&mut self, prices: PriceMap) {
        self.prices.extend(prices);
    }
}

impl PricingSource for StaticPrices {
    fn base_currency(&self) -> &UnitSymbol {
        &self.base_currency
    }

    fn get_price(&self, unit: &UnitSymbol, _: DateTime<Utc>) -> Option<Decimal> {
        self.prices.get(unit).copied()
    }
}

/// Time-varying prices: piecewise-constant, most recent observation at or before the
/// requested timestamp (binary search).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesPrices {
    base_currency: UnitSymbol,
    history: BTreeMap<UnitSymbol, Vec<(DateTime<Utc>, Decimal)>>,
}

impl TimeSeriesPrices {
    /// Construct a new [`Self`] from complete price paths, sorting each path
    /// chronologically.
    pub fn new<Symbol>(
        price_paths: BTreeMap<UnitSymbol, Vec<(DateTime<Utc>, Decimal)>>,
        base_currency: Symbol,
    ) -> Self
    where
        Symbol: Into<UnitSymbol>,
    {
        let history = price_paths
            .into_iter()
            .filter(|(_, path)| !path.is_empty())
            .map(|(unit, mut path)| {
                path.sort_by_key(|(timestamp, _)| *timestamp);
                (unit, path)
            })
            .collect();

        Self {
            base_currency: base_currency.into(),
            history,
        }
    }

    /// Construct an empty [`Self`] for incremental observation via [`Self::add_price`].
    pub fn empty<Symbol>(base_currency: Symbol) -> Self
    where
        Symbol: Into<UnitSymbol>,
    {
        Self {
            base_currency: base_currency.into(),
            history: BTreeMap::new(),
        }
    }

    /// Add a price observation, keeping the unit's path sorted.
    pub fn add_price<Symbol>(&mut self, unit: Symbol, timestamp: DateTime<Utc>, price: Decimal)
    where
        Symbol: Into<UnitSymbol>,
    {
        let path = self.history.entry(unit.into()).or_default();
        let index = path.partition_point(|(observed, _)| *observed <= timestamp);
        path.insert(index, (timestamp, price));
    }

    /// Add multiple observations at the same timestamp.
    pub fn add_prices(&mut self, prices: PriceMap, timestamp: DateTime<Utc>) {
        for (unit, price) in prices {
            self.add_price(unit, timestamp, price);
        }
    }

    /// All observation timestamps, for one unit or the sorted union across units.
    pub fn all_timestamps(&self, unit: Option<&UnitSymbol>) -> Vec<DateTime<Utc>> {
        match unit {
            Some(unit) => self
                .history
                .get(unit)
                .map(|path| path.iter().map(|(timestamp, _)| *timestamp).collect())
                .unwrap_or_default(),
            None => {
                let mut timestamps: Vec<_> = self
                    .history
                    .values()
                    .flat_map(|path| path.iter().map(|(timestamp, _)| *timestamp))
                    .collect();
                timestamps.sort_unstable();
                timestamps.dedup();
                timestamps
            }
        }
    }
}

impl PricingSource for TimeSeriesPrices {
    fn base_currency(&self) -> &UnitSymbol {
        &self.base_currency
    }

    fn get_price(&self, unit: &UnitSymbol, timestamp: DateTime<Utc>) -> Option<Decimal> {
        if unit == &self.base_currency {
            return Some(Decimal::ONE);
        }

        let path = self.history.get(unit)?;
        // Rightmost observation with time <= timestamp
        let index = path.partition_point(|(observed, _)| *observed <= timestamp);
        index
            .checked_sub(1)
            .and_then(|index| path.get(index))
            .map(|(_, price)| *price)
    }
}
