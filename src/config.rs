use crate::idempotency::{IdempotencyHandlerConfig, IDEMPOTENCY_HEADER};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub logging: LoggingSettings,
    pub idempotency: IdempotencySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    /// Request header carrying the client token.
    pub header_name: String,
}

impl From<&IdempotencySettings> for IdempotencyHandlerConfig {
    fn from(settings: &IdempotencySettings) -> Self {
        Self {
            header_name: settings.header_name.clone(),
        }
    }
}

impl Settings {
    /// Loads settings from built-in defaults, `config/default` and
    /// `config/local` (both optional), then `APP__*` environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("idempotency.header_name", IDEMPOTENCY_HEADER)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
