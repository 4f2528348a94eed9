use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where quotes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    Finnhub,
    Simulated,
}

impl FromStr for QuoteSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(QuoteSource::Finnhub),
            "simulated" | "sim" => Ok(QuoteSource::Simulated),
            other => Err(format!("unknown quote source '{}'", other)),
        }
    }
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSource::Finnhub => write!(f, "finnhub"),
            QuoteSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// Runtime configuration of the simulator
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub bind_addr: String,
    pub initial_wallet_balance: f64,
    /// Symbols inserted enabled at startup
    pub default_symbols: Vec<String>,

    pub quote_source: QuoteSource,
    pub finnhub_api_key: Option<String>,
    pub finnhub_rest_url: String,
    pub finnhub_ws_url: String,
    pub http_timeout_seconds: u64,

    pub price_cache_ttl_seconds: u64,
    pub quote_refresh_interval_seconds: u64,

    // Upstream stream reconnection
    pub stream_base_backoff_ms: u64,
    pub stream_max_backoff_ms: u64,
    pub stream_backoff_multiplier: f64,
    pub stream_max_retries: u32, // 0 = retry forever

    /// Max relative move per simulated tick (0.01 = 1%)
    pub simulated_volatility: f64,

    pub api_keys: Vec<String>,
    pub rate_limit_per_minute: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            initial_wallet_balance: 100_000.0,
            default_symbols: ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "TSLA", "META"]
                .iter()
                .map(|s| s.to_string())
                .collect(),

            quote_source: QuoteSource::Simulated,
            finnhub_api_key: None,
            finnhub_rest_url: "https://finnhub.io/api/v1".to_string(),
            finnhub_ws_url: "wss://ws.finnhub.io".to_string(),
            http_timeout_seconds: 10,

            price_cache_ttl_seconds: 15,
            quote_refresh_interval_seconds: 5,

            stream_base_backoff_ms: 1_000,
            stream_max_backoff_ms: 60_000,
            stream_backoff_multiplier: 2.0,
            stream_max_retries: 0,

            simulated_volatility: 0.01,

            api_keys: Vec::new(),
            rate_limit_per_minute: 120,
        }
    }
}

/// Parse `key` into `T`, keeping `current` when the variable is unset,
/// unparsable, or rejected by `valid`
fn env_override<T>(key: &str, current: T, valid: impl Fn(&T) -> bool, rule: &str) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return current;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} ({}), using default: {}",
                key,
                value,
                rule,
                current
            );
            current
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                key,
                raw,
                e,
                current
            );
            current
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl SimulatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SimulatorConfig {
        let mut config = SimulatorConfig::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            if !addr.trim().is_empty() {
                config.bind_addr = addr.trim().to_string();
            }
        }

        config.initial_wallet_balance = env_override(
            "INITIAL_WALLET_BALANCE",
            config.initial_wallet_balance,
            |v: &f64| v.is_finite() && *v >= 0.0,
            "must be a non-negative amount",
        );

        if let Ok(symbols) = std::env::var("DEFAULT_SYMBOLS") {
            config.default_symbols = split_list(&symbols);
        }

        config.finnhub_api_key = std::env::var("FINNHUB_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        // Finnhub when a key is present, unless explicitly overridden
        config.quote_source = if config.finnhub_api_key.is_some() {
            QuoteSource::Finnhub
        } else {
            QuoteSource::Simulated
        };
        if let Ok(source) = std::env::var("QUOTE_SOURCE") {
            match source.parse::<QuoteSource>() {
                Ok(source) => config.quote_source = source,
                Err(e) => tracing::warn!(
                    "Invalid QUOTE_SOURCE: {}, using: {}",
                    e,
                    config.quote_source
                ),
            }
        }
        if config.quote_source == QuoteSource::Finnhub && config.finnhub_api_key.is_none() {
            tracing::warn!("QUOTE_SOURCE=finnhub but FINNHUB_API_KEY is not set, falling back to simulated quotes");
            config.quote_source = QuoteSource::Simulated;
        }

        if let Ok(url) = std::env::var("FINNHUB_REST_URL") {
            config.finnhub_rest_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("FINNHUB_WS_URL") {
            config.finnhub_ws_url = url.trim().to_string();
        }

        config.http_timeout_seconds = env_override(
            "HTTP_TIMEOUT_SECONDS",
            config.http_timeout_seconds,
            |v: &u64| (1..=120).contains(v),
            "must be between 1 and 120",
        );
        config.price_cache_ttl_seconds = env_override(
            "PRICE_CACHE_TTL_SECONDS",
            config.price_cache_ttl_seconds,
            |v: &u64| *v <= 3_600,
            "must be at most 3600",
        );
        config.quote_refresh_interval_seconds = env_override(
            "QUOTE_REFRESH_INTERVAL_SECONDS",
            config.quote_refresh_interval_seconds,
            |v: &u64| (1..=3_600).contains(v),
            "must be between 1 and 3600",
        );

        config.stream_base_backoff_ms = env_override(
            "STREAM_BASE_BACKOFF_MS",
            config.stream_base_backoff_ms,
            |v: &u64| (10..=60_000).contains(v),
            "must be between 10 and 60000",
        );
        config.stream_max_backoff_ms = env_override(
            "STREAM_MAX_BACKOFF_MS",
            config.stream_max_backoff_ms,
            |v: &u64| (100..=600_000).contains(v),
            "must be between 100 and 600000",
        );
        if config.stream_max_backoff_ms < config.stream_base_backoff_ms {
            tracing::warn!(
                "STREAM_MAX_BACKOFF_MS ({}) is below STREAM_BASE_BACKOFF_MS ({}), raising it",
                config.stream_max_backoff_ms,
                config.stream_base_backoff_ms
            );
            config.stream_max_backoff_ms = config.stream_base_backoff_ms;
        }
        config.stream_backoff_multiplier = env_override(
            "STREAM_BACKOFF_MULTIPLIER",
            config.stream_backoff_multiplier,
            |v: &f64| (1.0..=10.0).contains(v),
            "must be between 1.0 and 10.0",
        );
        config.stream_max_retries = env_override(
            "STREAM_MAX_RETRIES",
            config.stream_max_retries,
            |_: &u32| true,
            "",
        );

        config.simulated_volatility = env_override(
            "SIMULATED_VOLATILITY",
            config.simulated_volatility,
            |v: &f64| *v > 0.0 && *v <= 0.2,
            "must be in (0.0, 0.2]",
        );

        if let Ok(keys) = std::env::var("API_KEYS") {
            config.api_keys = split_list(&keys);
        }
        config.rate_limit_per_minute = env_override(
            "RATE_LIMIT_PER_MINUTE",
            config.rate_limit_per_minute,
            |v: &u32| (1..=100_000).contains(v),
            "must be between 1 and 100000",
        );

        config
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_seconds)
    }

    pub fn quote_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.quote_refresh_interval_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulatorConfig::default();
        assert_eq!(config.quote_source, QuoteSource::Simulated);
        assert_eq!(config.initial_wallet_balance, 100_000.0);
        assert!(config.default_symbols.contains(&"AAPL".to_string()));
        assert_eq!(config.stream_max_retries, 0);
        assert!(config.stream_max_backoff_ms >= config.stream_base_backoff_ms);
        assert!(config.api_keys.is_empty());
    }

    #[test]
    fn test_quote_source_parsing() {
        assert_eq!("Finnhub".parse::<QuoteSource>(), Ok(QuoteSource::Finnhub));
        assert_eq!(" simulated ".parse::<QuoteSource>(), Ok(QuoteSource::Simulated));
        assert!("yahoo".parse::<QuoteSource>().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("AAPL, MSFT,,TSLA "), vec!["AAPL", "MSFT", "TSLA"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_env_override_rejects_out_of_range() {
        std::env::set_var("STOCKSIM_TEST_OVERRIDE_RANGE", "500");
        let value = env_override(
            "STOCKSIM_TEST_OVERRIDE_RANGE",
            5u64,
            |v: &u64| *v <= 100,
            "must be at most 100",
        );
        assert_eq!(value, 5);

        std::env::set_var("STOCKSIM_TEST_OVERRIDE_RANGE", "50");
        let value = env_override(
            "STOCKSIM_TEST_OVERRIDE_RANGE",
            5u64,
            |v: &u64| *v <= 100,
            "must be at most 100",
        );
        assert_eq!(value, 50);
        std::env::remove_var("STOCKSIM_TEST_OVERRIDE_RANGE");
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        std::env::set_var("STOCKSIM_TEST_OVERRIDE_GARBAGE", "not-a-number");
        let value = env_override("STOCKSIM_TEST_OVERRIDE_GARBAGE", 2.0f64, |_: &f64| true, "");
        assert_eq!(value, 2.0);
        std::env::remove_var("STOCKSIM_TEST_OVERRIDE_GARBAGE");
    }
}
