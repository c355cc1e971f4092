use rust_decimal::Decimal;
use serde::Deserialize;

/// Engine-wide configuration, enumerated per the deployment's environment.
///
/// Loaded with [`EngineConfig::load`], which layers compiled-in defaults
/// under an optional config file under `BILLING_`-prefixed environment
/// variables. `tax_rate` and `allowed_origins` are carried here purely for a
/// downstream HTTP/consumer layer to read; the billing pipeline itself never
/// applies tax or CORS policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection string for whichever persistence layer wraps the engine's
    /// storage traits. Unused by the in-memory store shipped in this crate.
    pub database_url: String,
    /// Default number of days between an invoice's issue date and its due
    /// date, used when a subscription does not override it.
    pub default_payment_term_days: i64,
    /// A flat tax rate left for an invoice consumer to apply; the core
    /// pipeline does not compute tax.
    pub tax_rate: Decimal,
    /// The ISO-4217 currency code all monetary amounts are denominated in.
    pub currency: String,
    /// Origins allowed to reach a downstream HTTP surface built on this
    /// engine.
    pub allowed_origins: Vec<String>,
    /// Enables verbose diagnostic logging.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            database_url: "sqlite://billing.db".into(),
            default_payment_term_days: 30,
            tax_rate: Decimal::ZERO,
            currency: "USD".into(),
            allowed_origins: vec!["*".into()],
            debug: false,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from compiled-in defaults, optionally overridden
    /// by a config file at `path` and then by `BILLING_`-prefixed
    /// environment variables (e.g. `BILLING_CURRENCY=EUR`).
    pub fn load(path: Option<&str>) -> Result<EngineConfig, config::ConfigError> {
        let defaults = EngineConfig::default();
        let mut builder = config::Config::builder()
            .set_default("database_url", defaults.database_url.clone())?
            .set_default(
                "default_payment_term_days",
                defaults.default_payment_term_days,
            )?
            .set_default("tax_rate", defaults.tax_rate.to_string())?
            .set_default("currency", defaults.currency.clone())?
            .set_default("allowed_origins", defaults.allowed_origins.clone())?
            .set_default("debug", defaults.debug)?;
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("BILLING")
                .try_parsing(true)
                .list_separator(","),
        );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let config = EngineConfig::default();
        assert_eq!(config.default_payment_term_days, 30);
        assert_eq!(config.currency, "USD");
        assert_eq!(config.allowed_origins, vec!["*".to_string()]);
        assert!(!config.debug);
        assert_eq!(config.tax_rate, Decimal::ZERO);
    }

    #[test]
    fn environment_overrides_defaults() {
        std::env::set_var("BILLING_CURRENCY", "EUR");
        std::env::set_var("BILLING_DEBUG", "true");
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.currency, "EUR");
        assert!(config.debug);
        std::env::remove_var("BILLING_CURRENCY");
        std::env::remove_var("BILLING_DEBUG");
    }
}
