use config::{Config, Environment};
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct ApiSettings {
    pub address: String,
    pub port: u16,
}

impl ApiSettings {
    pub fn try_from_env() -> Result<Self, config::ConfigError> {
        Config::builder()
            .set_default("address", "0.0.0.0")?
            .set_default("port", 8000)?
            .add_source(Environment::with_prefix("HALLEY").prefix_separator("_"))
            .build()?
            .try_deserialize::<Self>()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub path: String,
}

impl DatabaseSettings {
    pub fn try_from_env() -> Result<Self, config::ConfigError> {
        Config::builder()
            .set_default("path", "data/db/advisories.db")?
            .add_source(Environment::with_prefix("DB").prefix_separator("_"))
            .build()?
            .try_deserialize::<Self>()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct NvdSettings {
    pub api_key: Option<String>,
}

impl NvdSettings {
    pub fn try_from_env() -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("NVD").prefix_separator("_"))
            .build()?
            .try_deserialize::<Self>()
    }
}
