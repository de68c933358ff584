use std::str::FromStr;
use std::time::Duration;

use market::patterns::TESTING_DIVISOR;
use market::{ChartSettings, DetectorConfig, LiquidityScaling, Network, PoolStats, RepeatedPoolKey, Timeframe};

use crate::api::cooldown::Cooldown;
use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Chain whose pools are tracked.
    pub network: Network,

    /// Emits JSON logs when `APP_ENV=production`.
    pub production: bool,

    /// Makes patterns far easier to hit by dividing every requirement by a
    /// fixed factor instead of scaling it by liquidity. For trying out the
    /// notification path only.
    pub testing_mode: bool,

    // =========================
    // Charts and patterns
    // =========================
    /// Ticks kept per pool; one tick per minute.
    pub chart_max_ticks: usize,

    /// Newest segment may be skipped when matching if it spans at most this.
    pub delay_tolerance: Option<Duration>,

    /// A move overlapping the last reported one is reported again only after
    /// this long. `None` never repeats.
    pub repetition_cooldown: Option<Duration>,

    // =========================
    // Pool selection
    // =========================
    /// Pools below either figure (USD) are not tracked.
    pub min_liquidity: f64,
    pub min_volume: f64,

    /// Keep one pool per token pair, picked by this figure.
    pub repeated_pool_key: Option<RepeatedPoolKey>,

    // =========================
    // Cycle cadence
    // =========================
    /// Re-check the inclusion filter every N cycles.
    pub apply_filter_every: u64,

    /// Discover new pools every N cycles.
    pub fetch_new_every: u64,

    /// Extra pause after each cycle on top of what the rate limits require.
    pub additional_cooldown: Duration,

    /// Live ticks are stamped this far in the past, so that the snapshot
    /// price lines up with the candle that upstream is still aggregating.
    pub snapshot_delay: Duration,

    // =========================
    // Upstream errors
    // =========================
    /// First delay after a 429/500 response.
    pub error_cooldown: Duration,

    pub error_cooldown_multiplier: f64,

    /// Delay falls back to `error_cooldown` after this long without errors.
    pub error_cooldown_reset: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::Ton,
            production: false,
            testing_mode: false,

            chart_max_ticks: 2000,
            delay_tolerance: Some(Duration::from_secs(5 * 60)),
            repetition_cooldown: Some(Duration::from_secs(6 * 3600)),

            min_liquidity: 3_000.0,
            min_volume: 3_000.0,
            repeated_pool_key: Some(RepeatedPoolKey::Volume),

            apply_filter_every: 1,
            fetch_new_every: 60,
            additional_cooldown: Duration::ZERO,
            snapshot_delay: Duration::ZERO,

            error_cooldown: Duration::from_secs_f64(0.9375),
            error_cooldown_multiplier: 2.0,
            error_cooldown_reset: Some(Duration::from_secs(20 * 60)),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys keep their
    /// defaults, malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let minutes = |key: &str, default: Option<Duration>| -> Result<Option<Duration>, AppError> {
            match get(key) {
                None => Ok(default),
                Some(v) => Ok(non_zero(Duration::from_secs(parse::<u64>(key, &v)? * 60))),
            }
        };
        let seconds = |key: &str, default: Duration| -> Result<Duration, AppError> {
            match get(key) {
                None => Ok(default),
                Some(v) => secs_f64(key, parse::<f64>(key, &v)?),
            }
        };

        let repeated_pool_key = match get("POOLSCAN_REPEATED_POOL_KEY") {
            None => d.repeated_pool_key,
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(v.parse().map_err(AppError::Config)?),
        };

        let repetition_cooldown = match get("POOLSCAN_REPETITION_COOLDOWN_H") {
            None => d.repetition_cooldown,
            Some(v) => non_zero(Duration::from_secs(
                parse::<u64>("POOLSCAN_REPETITION_COOLDOWN_H", &v)? * 3600,
            )),
        };

        let cfg = Self {
            network: match get("POOLSCAN_NETWORK") {
                None => d.network,
                Some(v) => Network::from_id(&v).map_err(|e| AppError::Config(e.to_string()))?,
            },
            production: get("APP_ENV").is_some_and(|v| v == "production"),
            testing_mode: match get("POOLSCAN_TESTING_MODE") {
                None => d.testing_mode,
                Some(v) => parse_bool("POOLSCAN_TESTING_MODE", &v)?,
            },

            chart_max_ticks: parse_or("POOLSCAN_CHART_MAX_TICKS", get("POOLSCAN_CHART_MAX_TICKS"), d.chart_max_ticks)?,
            delay_tolerance: minutes("POOLSCAN_DELAY_TOLERANCE_MIN", d.delay_tolerance)?,
            repetition_cooldown,

            min_liquidity: parse_or("POOLSCAN_MIN_LIQUIDITY", get("POOLSCAN_MIN_LIQUIDITY"), d.min_liquidity)?,
            min_volume: parse_or("POOLSCAN_MIN_VOLUME", get("POOLSCAN_MIN_VOLUME"), d.min_volume)?,
            repeated_pool_key,

            apply_filter_every: parse_or(
                "POOLSCAN_APPLY_FILTER_EVERY",
                get("POOLSCAN_APPLY_FILTER_EVERY"),
                d.apply_filter_every,
            )?,
            fetch_new_every: parse_or("POOLSCAN_FETCH_NEW_EVERY", get("POOLSCAN_FETCH_NEW_EVERY"), d.fetch_new_every)?,
            additional_cooldown: seconds("POOLSCAN_ADDITIONAL_COOLDOWN_S", d.additional_cooldown)?,
            snapshot_delay: seconds("POOLSCAN_SNAPSHOT_DELAY_S", d.snapshot_delay)?,

            error_cooldown: seconds("POOLSCAN_ERROR_COOLDOWN_S", d.error_cooldown)?,
            error_cooldown_multiplier: parse_or(
                "POOLSCAN_ERROR_COOLDOWN_MULTIPLIER",
                get("POOLSCAN_ERROR_COOLDOWN_MULTIPLIER"),
                d.error_cooldown_multiplier,
            )?,
            error_cooldown_reset: minutes("POOLSCAN_ERROR_COOLDOWN_RESET_MIN", d.error_cooldown_reset)?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.chart_max_ticks == 0 {
            return Err(AppError::Config("POOLSCAN_CHART_MAX_TICKS must be positive".into()));
        }
        if self.apply_filter_every == 0 || self.fetch_new_every == 0 {
            return Err(AppError::Config("cycle intervals must be positive".into()));
        }
        if self.error_cooldown_multiplier < 1.0 {
            return Err(AppError::Config("POOLSCAN_ERROR_COOLDOWN_MULTIPLIER must be >= 1".into()));
        }
        Ok(())
    }

    pub fn pattern_config(&self) -> DetectorConfig {
        let scaling = if self.testing_mode {
            LiquidityScaling::FixedDivisor(TESTING_DIVISOR)
        } else {
            LiquidityScaling::default()
        };

        DetectorConfig {
            delay_tolerance: self.delay_tolerance.and_then(to_timeframe),
            scaling,
            coarse_views_first: true,
        }
    }

    pub fn chart_settings(&self) -> ChartSettings {
        ChartSettings {
            max_ticks: self.chart_max_ticks,
            repetition_cooldown: self.repetition_cooldown.and_then(to_timeframe),
        }
    }

    pub fn error_cooldown(&self) -> Cooldown {
        let cooldown = Cooldown::new(self.error_cooldown, self.error_cooldown_multiplier);
        match self.error_cooldown_reset {
            Some(after) => cooldown.with_auto_reset(after),
            None => cooldown,
        }
    }

    /// Inclusion predicate for the registry.
    pub fn pool_filter(&self) -> impl Fn(&PoolStats) -> bool + Send + Sync + 'static {
        let (min_liquidity, min_volume) = (self.min_liquidity, self.min_volume);
        move |s: &PoolStats| s.liquidity >= min_liquidity && s.volume >= min_volume
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key}: cannot parse {raw:?}")))
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError> {
    match raw {
        None => Ok(default),
        Some(v) => parse(key, &v),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{key}: expected a boolean, got {raw:?}"))),
    }
}

fn secs_f64(key: &str, secs: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(secs).map_err(|_| AppError::Config(format!("{key}: invalid duration {secs}")))
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

fn to_timeframe(d: Duration) -> Option<Timeframe> {
    Timeframe::from_std(d).ok()
}
