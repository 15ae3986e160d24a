use tracing::info;

use crate::{Error, Result, TradingMode};

/// Deployment settings and secrets, loaded from environment variables at
/// startup. Trading parameters live in the TOML file named by
/// `trading_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (required in live mode only)
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,

    // Telegram
    pub telegram_token: String,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,
    pub paper_initial_balance: f64,

    // Database
    pub database_url: String,

    // Trading parameters file path
    pub trading_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                Error::Config(format!(
                    "Required environment variable '{key}' is not set. Check your .env file."
                ))
            })
        };

        let trading_mode = match required("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let telegram_allowed_user_ids = required("TELEGRAM_ALLOWED_USER_IDS")?
            .split(',')
            .map(|s| {
                s.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!(
                        "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                        s.trim()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (
                Some(required("BINANCE_API_KEY")?),
                Some(required("BINANCE_SECRET")?),
            ),
            TradingMode::Paper => (lookup("BINANCE_API_KEY"), lookup("BINANCE_SECRET")),
        };

        let parsed = |key: &str, default: f64| -> Result<f64> {
            match lookup(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| Error::Config(format!("{key} must be a number, got '{v}'"))),
                None => Ok(default),
            }
        };

        let config = Config {
            binance_api_key,
            binance_secret,
            telegram_token: required("TELEGRAM_TOKEN")?,
            telegram_allowed_user_ids,
            trading_mode,
            paper_slippage_bps: parsed("PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_initial_balance: parsed("PAPER_INITIAL_BALANCE", 10_000.0)?,
            database_url: required("DATABASE_URL")?,
            trading_config_path: lookup("TRADING_CONFIG_PATH")
                .unwrap_or_else(|| "config/trading.toml".to_string()),
        };
        info!(mode = %config.trading_mode, path = %config.trading_config_path, "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        env(&[
            ("TRADING_MODE", "paper"),
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_ALLOWED_USER_IDS", "42, 7"),
            ("DATABASE_URL", "sqlite://trades.db"),
        ])
    }

    #[test]
    fn paper_mode_needs_no_exchange_keys() {
        let vars = base();
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert_eq!(cfg.telegram_allowed_user_ids, vec![42, 7]);
        assert_eq!(cfg.paper_slippage_bps, 10.0);
        assert_eq!(cfg.trading_config_path, "config/trading.toml");
        assert!(cfg.binance_api_key.is_none());
    }

    #[test]
    fn live_mode_requires_exchange_keys() {
        let mut vars = base();
        vars.insert("TRADING_MODE".into(), "LIVE".into());
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("BINANCE_API_KEY"));
    }

    #[test]
    fn rejects_bad_user_ids_and_numbers() {
        let mut vars = base();
        vars.insert("TELEGRAM_ALLOWED_USER_IDS".into(), "42,bob".into());
        assert!(Config::from_lookup(|k| vars.get(k).cloned()).is_err());

        let mut vars = base();
        vars.insert("PAPER_SLIPPAGE_BPS".into(), "lots".into());
        assert!(Config::from_lookup(|k| vars.get(k).cloned()).is_err());
    }
}
