use std::fmt;
use std::str::FromStr;

use crate::chart::{Chart, ChartSettings};
use crate::error::MarketError;
use crate::time::Timestamp;

pub type Address = String;

/// Supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    Ton,
}

impl Network {
    pub const ALL: [Network; 1] = [Network::Ton];

    /// Identifier used by both upstream APIs.
    pub fn id(self) -> &'static str {
        match self {
            Network::Ton => "ton",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::Ton => "TON",
        }
    }

    pub fn native_token_address(self) -> &'static str {
        match self {
            Network::Ton => "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c",
        }
    }

    pub fn native_token_ticker(self) -> &'static str {
        match self {
            Network::Ton => "TON",
        }
    }

    pub fn from_id(id: &str) -> Result<Self, MarketError> {
        Self::ALL
            .into_iter()
            .find(|n| n.id() == id)
            .ok_or_else(|| MarketError::UnknownNetwork(id.to_string()))
    }
}

impl FromStr for Network {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::from_id(s)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    pub network: Network,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub network: Network,
    pub address: Address,
    pub ticker: String,
    pub name: String,
}

impl Token {
    pub fn key(&self) -> TokenKey {
        TokenKey {
            network: self.network,
            address: self.address.clone(),
        }
    }

    pub fn is_native_currency(&self) -> bool {
        self.address == self.network.native_token_address()
    }

    /// Refreshes display fields from a fresher copy of the same token.
    pub fn update(&mut self, other: &Token) {
        self.ticker.clone_from(&other.ticker);
        self.name.clone_from(&other.name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexKey {
    pub network: Network,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dex {
    pub network: Network,
    pub id: String,
    pub name: String,
}

impl Dex {
    /// Resolves the display name for known DEX ids, falling back to the id.
    pub fn from_id(network: Network, id: &str) -> Self {
        let name = match id {
            "stonfi" => "STON.fi",
            "dedust" => "DeDust",
            other => other,
        };
        Self {
            network,
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn key(&self) -> DexKey {
        DexKey {
            network: self.network,
            id: self.id.clone(),
        }
    }

    pub fn update(&mut self, other: &Dex) {
        self.name.clone_from(&other.name);
    }
}

/// A figure reported over the standard upstream periods.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimePeriods {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

/// Mutable market figures of a pool, refreshed on every snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    /// Price of the base token in quote tokens.
    pub price_native: f64,
    pub price_usd: f64,
    pub fdv: f64,
    /// 24h volume in USD.
    pub volume: f64,
    /// Liquidity in USD.
    pub liquidity: f64,
    /// Percentages, as reported upstream.
    pub price_change: TimePeriods,
    pub creation_date: Timestamp,
}

/// A pool as reported by the snapshot API, with owned token/DEX data.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub network: Network,
    pub address: Address,
    pub base_token: Token,
    pub quote_token: Token,
    pub dex: Dex,
    pub stats: PoolStats,
}

/// A tracked pool. Tokens and DEX live in the registry and are referenced by
/// key, so one update to a token is seen by every pool that trades it.
#[derive(Debug, Clone)]
pub struct Pool {
    pub network: Network,
    pub address: Address,
    pub base_token: TokenKey,
    pub quote_token: TokenKey,
    pub dex: DexKey,
    pub stats: PoolStats,
    pub chart: Chart,
}

impl Pool {
    pub fn from_snapshot(snapshot: &PoolSnapshot, chart: ChartSettings) -> Result<Self, MarketError> {
        Ok(Self {
            network: snapshot.network,
            address: snapshot.address.clone(),
            base_token: snapshot.base_token.key(),
            quote_token: snapshot.quote_token.key(),
            dex: snapshot.dex.key(),
            stats: snapshot.stats.clone(),
            chart: Chart::new(chart)?,
        })
    }

    /// Copies every mutable field from a fresh snapshot; the chart is kept.
    pub fn merge(&mut self, snapshot: &PoolSnapshot) {
        self.base_token = snapshot.base_token.key();
        self.quote_token = snapshot.quote_token.key();
        self.dex = snapshot.dex.key();
        self.stats = snapshot.stats.clone();
    }

    pub fn trades_pair(&self, base: &TokenKey, quote: &TokenKey) -> bool {
        &self.base_token == base && &self.quote_token == quote
    }

    pub fn has_native_quote_token(&self) -> bool {
        self.quote_token.address == self.network.native_token_address()
    }

    pub fn liquidity(&self) -> f64 {
        self.stats.liquidity
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Pool {}
