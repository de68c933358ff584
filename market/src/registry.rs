//! Tracked pools and the tokens and DEXes they reference.
//!
//! Pools are keyed by address. Tokens and DEXes are stored once and pools
//! point at them by key; entries nobody references any more are pruned
//! whenever pools leave the registry.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::chart::ChartSettings;
use crate::error::MarketError;
use crate::tick::Tick;
use crate::time::{Timestamp, floor_to_minute};
use crate::types::{Address, Dex, DexKey, Pool, PoolSnapshot, PoolStats, Token, TokenKey};

/// Inclusion predicate evaluated against fresh pool figures.
pub type PoolFilter = Box<dyn Fn(&PoolStats) -> bool + Send + Sync>;

/// Figure used to pick one pool per token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatedPoolKey {
    Volume,
    Liquidity,
}

impl RepeatedPoolKey {
    pub fn value(self, stats: &PoolStats) -> f64 {
        match self {
            RepeatedPoolKey::Volume => stats.volume,
            RepeatedPoolKey::Liquidity => stats.liquidity,
        }
    }
}

impl FromStr for RepeatedPoolKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "volume" => Ok(RepeatedPoolKey::Volume),
            "liquidity" => Ok(RepeatedPoolKey::Liquidity),
            other => Err(format!("unknown repeated pool key: {other}")),
        }
    }
}

/// What a single [`PoolRegistry::update`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Pools merged or inserted by this call, in snapshot order.
    pub refreshed: Vec<Address>,
    pub added: usize,
    pub updated: usize,
    pub filtered_out: usize,
    /// Incoming pools that lost against an existing pool for the same pair.
    pub rejected_repeats: usize,
    /// Existing pools replaced by a better pool for the same pair.
    pub evicted: usize,
}

pub struct PoolRegistry {
    pools: HashMap<Address, Pool>,
    tokens: HashMap<TokenKey, Token>,
    dexes: HashMap<DexKey, Dex>,
    filter: Option<PoolFilter>,
    repeated_pool_key: Option<RepeatedPoolKey>,
    chart_settings: ChartSettings,
}

impl PoolRegistry {
    pub fn new(chart_settings: ChartSettings) -> Self {
        Self {
            pools: HashMap::new(),
            tokens: HashMap::new(),
            dexes: HashMap::new(),
            filter: None,
            repeated_pool_key: None,
            chart_settings,
        }
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&PoolStats) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_repeated_pool_key(mut self, key: Option<RepeatedPoolKey>) -> Self {
        self.repeated_pool_key = key;
        self
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.pools.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<&Pool> {
        self.pools.get(address)
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut Pool> {
        self.pools.get_mut(address)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn pools_mut(&mut self) -> impl Iterator<Item = &mut Pool> {
        self.pools.values_mut()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.pools.keys().cloned().collect()
    }

    pub fn token(&self, key: &TokenKey) -> Option<&Token> {
        self.tokens.get(key)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn dex(&self, key: &DexKey) -> Option<&Dex> {
        self.dexes.get(key)
    }

    pub fn dexes(&self) -> impl Iterator<Item = &Dex> {
        self.dexes.values()
    }

    /// `BASE / QUOTE (dex)` using the registry's current tickers.
    pub fn pool_name(&self, pool: &Pool) -> String {
        let ticker = |k: &TokenKey| {
            self.tokens
                .get(k)
                .map(|t| t.ticker.clone())
                .unwrap_or_else(|| k.address.clone())
        };
        format!("{} / {} ({})", ticker(&pool.base_token), ticker(&pool.quote_token), pool.dex.id)
    }

    /// Merges fresh snapshots, feeding each changed price into its chart as a
    /// provisional tick at the minute of `timestamp`.
    pub fn update<I>(&mut self, snapshots: I, timestamp: Timestamp) -> Result<UpdateSummary, MarketError>
    where
        I: IntoIterator<Item = PoolSnapshot>,
    {
        let mut summary = UpdateSummary::default();
        let tick_ts = floor_to_minute(timestamp);

        for snapshot in snapshots {
            if self.filter.as_ref().is_some_and(|f| !f(&snapshot.stats)) {
                // A tracked pool keeps the failing figures so the next
                // `apply_filter` pass drops it.
                if let Some(pool) = self.pools.get_mut(&snapshot.address) {
                    pool.stats = snapshot.stats.clone();
                }
                summary.filtered_out += 1;
                continue;
            }

            if let Some(key) = self.repeated_pool_key {
                if let Some(existing) = self.same_pair_pool(&snapshot) {
                    let existing_value = key.value(&self.pools[&existing].stats);

                    if key.value(&snapshot.stats) > existing_value {
                        debug!(evicted = %existing, by = %snapshot.address, "replacing pool for repeated pair");
                        self.pools.remove(&existing);
                        self.prune_references();
                        summary.evicted += 1;
                    } else {
                        summary.rejected_repeats += 1;
                        continue;
                    }
                }
            }

            self.upsert_references(&snapshot);

            let previous_price = self.pools.get(&snapshot.address).map(|p| p.stats.price_native);
            let pool = match self.pools.entry(snapshot.address.clone()) {
                Entry::Occupied(entry) => {
                    let pool = entry.into_mut();
                    pool.merge(&snapshot);
                    summary.updated += 1;
                    pool
                }
                Entry::Vacant(entry) => {
                    summary.added += 1;
                    entry.insert(Pool::from_snapshot(&snapshot, self.chart_settings)?)
                }
            };
            summary.refreshed.push(snapshot.address.clone());

            if previous_price != Some(pool.stats.price_native) || pool.chart.is_empty() {
                pool.chart
                    .update_one(Tick::incomplete(tick_ts, pool.stats.price_native))?;
            }
        }

        Ok(summary)
    }

    /// Drops pools that no longer pass the filter. Returns how many left.
    pub fn apply_filter(&mut self) -> usize {
        let Some(filter) = self.filter.as_ref() else {
            return 0;
        };

        let before = self.pools.len();
        self.pools.retain(|_, p| filter(&p.stats));
        let removed = before - self.pools.len();

        if removed > 0 {
            self.prune_references();
        }
        removed
    }

    pub fn remove(&mut self, address: &str) -> Option<Pool> {
        let pool = self.pools.remove(address)?;
        self.prune_references();
        Some(pool)
    }

    /// Appends the current price of each listed pool at the minute of
    /// `timestamp`. Pass the addresses a snapshot round actually refreshed so
    /// a pool missing from that round does not repeat a stale price.
    pub fn append_live_ticks(&mut self, addresses: &[Address], timestamp: Timestamp) -> Result<(), MarketError> {
        let tick_ts = floor_to_minute(timestamp);
        for address in addresses {
            if let Some(pool) = self.pools.get_mut(address) {
                pool.chart
                    .update_one(Tick::incomplete(tick_ts, pool.stats.price_native))?;
            }
        }
        Ok(())
    }

    /// Best pool quoting `token` against the network's native currency.
    pub fn match_pool(&self, token: &TokenKey, key: RepeatedPoolKey) -> Option<&Pool> {
        self.pools
            .values()
            .filter(|p| &p.base_token == token && p.has_native_quote_token())
            .max_by(|a, b| key.value(&a.stats).total_cmp(&key.value(&b.stats)))
    }

    fn same_pair_pool(&self, snapshot: &PoolSnapshot) -> Option<Address> {
        let (base, quote) = (snapshot.base_token.key(), snapshot.quote_token.key());
        self.pools
            .values()
            .find(|p| p.address != snapshot.address && p.trades_pair(&base, &quote))
            .map(|p| p.address.clone())
    }

    fn upsert_references(&mut self, snapshot: &PoolSnapshot) {
        for token in [&snapshot.base_token, &snapshot.quote_token] {
            self.tokens
                .entry(token.key())
                .and_modify(|t| t.update(token))
                .or_insert_with(|| token.clone());
        }
        self.dexes
            .entry(snapshot.dex.key())
            .and_modify(|d| d.update(&snapshot.dex))
            .or_insert_with(|| snapshot.dex.clone());
    }

    fn prune_references(&mut self) {
        let mut used_tokens = HashSet::new();
        let mut used_dexes = HashSet::new();
        for p in self.pools.values() {
            used_tokens.insert(&p.base_token);
            used_tokens.insert(&p.quote_token);
            used_dexes.insert(&p.dex);
        }

        self.tokens.retain(|k, _| used_tokens.contains(k));
        self.dexes.retain(|k, _| used_dexes.contains(k));
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .field("tokens", &self.tokens.len())
            .field("dexes", &self.dexes.len())
            .field("repeated_pool_key", &self.repeated_pool_key)
            .finish()
    }
}
