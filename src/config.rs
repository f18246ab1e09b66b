use config::{Config, ConfigError, Environment};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Runtime settings, read from the process environment (and `.env` when present).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub project_name: String,
    pub host: String,
    pub port: u16,

    pub database_url: Option<String>,
    pub postgres_server: String,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub database_max_connections: u32,

    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub backend_cors_origins: Vec<String>,

    pub min_deposit_amount: Decimal,
    pub max_deposit_amount: Decimal,
    pub min_withdrawal_amount: Decimal,
    pub max_withdrawal_amount: Decimal,
    pub currency: String,

    pub csv_export_path: String,
    pub callback_timeout_secs: u64,
    pub payment_expiry_minutes: i64,
    pub expiry_sweep_interval_secs: u64,

    pub first_admin_email: Option<String>,
    pub first_admin_password: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let environment = Environment::default()
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("backend_cors_origins");

        Self::from_builder(Config::builder().add_source(environment))
    }

    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        builder
            .set_default("project_name", "Payment System API")?
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .set_default("postgres_server", "localhost")?
            .set_default("postgres_user", "postgres")?
            .set_default("postgres_password", "postgres")?
            .set_default("postgres_db", "payment_system")?
            .set_default("database_max_connections", 10)?
            // 8 days
            .set_default("access_token_expire_minutes", 60 * 24 * 8)?
            .set_default("backend_cors_origins", vec!["http://localhost:3000"])?
            .set_default("min_deposit_amount", 500)?
            .set_default("max_deposit_amount", 300_000)?
            .set_default("min_withdrawal_amount", 1000)?
            .set_default("max_withdrawal_amount", 1_000_000)?
            .set_default("currency", "INR")?
            .set_default("csv_export_path", "exports")?
            .set_default("callback_timeout_secs", 10)?
            .set_default("payment_expiry_minutes", 0)?
            .set_default("expiry_sweep_interval_secs", 60)?
            .build()?
            .try_deserialize()
    }

    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}/{}",
                self.postgres_user, self.postgres_password, self.postgres_server, self.postgres_db
            ),
        }
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(overrides: &[(&str, &str)]) -> Settings {
        let mut builder = Config::builder().set_override("secret_key", "test-secret").unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Settings::from_builder(builder).unwrap()
    }

    #[test]
    fn defaults_match_the_documented_limits() {
        let settings = settings_with(&[]);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.min_deposit_amount, Decimal::from(500));
        assert_eq!(settings.max_withdrawal_amount, Decimal::from(1_000_000));
        assert_eq!(settings.backend_cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(settings.payment_expiry_minutes, 0);
    }

    #[test]
    fn database_url_is_composed_when_absent() {
        let settings = settings_with(&[("postgres_server", "db"), ("postgres_password", "pw")]);
        assert_eq!(settings.database_url(), "postgres://postgres:pw@db/payment_system");

        let settings = settings_with(&[("database_url", "postgres://x/y")]);
        assert_eq!(settings.database_url(), "postgres://x/y");
    }

    #[test]
    fn secret_key_is_required() {
        assert!(Settings::from_builder(Config::builder()).is_err());
    }
}
