use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
        })
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
        })
    }
}

/// Settings for the external payment processor. Only the gateway needs
/// these; workers run without them.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub timeout_secs: u64,
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("PROCESSOR_BASE_URL").context("PROCESSOR_BASE_URL is required")?;
        let api_key =
            std::env::var("PROCESSOR_API_KEY").context("PROCESSOR_API_KEY is required")?;
        let webhook_secret = std::env::var("PROCESSOR_WEBHOOK_SECRET")
            .context("PROCESSOR_WEBHOOK_SECRET is required")?;
        let timeout_secs = std::env::var("PROCESSOR_TIMEOUT_SECS")
            .ok()
            .map(|raw| raw.parse::<u64>().context("PROCESSOR_TIMEOUT_SECS must be an integer"))
            .transpose()?
            .unwrap_or(15);

        Ok(Self {
            base_url,
            api_key,
            webhook_secret,
            timeout_secs,
        })
    }
}
