use serde::Deserialize;

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|v| {
            if v.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(v)
        })
}

fn optional_url(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Administrative alert sink. When unset, low-credit alerts are only
    /// logged.
    pub alert_webhook_url: Option<String>,
    /// Hard per-request timeout applied to every provider call.
    pub provider_timeout_secs: u64,
    pub apollo_api_key: String,
    pub apollo_base_url: String,
    pub linkedin_api_key: String,
    pub linkedin_base_url: String,
    pub instagram_access_token: String,
    pub instagram_base_url: String,
    pub tiktok_api_key: String,
    pub tiktok_base_url: String,
    pub google_maps_api_key: String,
    pub google_maps_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required("DATABASE_URL").and_then(|url| {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                Ok(url)
            })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_TIMEOUT_SECS must be a number"))?,
            apollo_api_key: required("APOLLO_API_KEY")?,
            apollo_base_url: optional_url("APOLLO_BASE_URL", "https://api.apollo.io")?,
            linkedin_api_key: required("LINKEDIN_API_KEY")?,
            linkedin_base_url: optional_url("LINKEDIN_BASE_URL", "https://api.salesnav.dev")?,
            instagram_access_token: required("INSTAGRAM_ACCESS_TOKEN")?,
            instagram_base_url: optional_url("INSTAGRAM_BASE_URL", "https://graph.facebook.com")?,
            tiktok_api_key: required("TIKTOK_API_KEY")?,
            tiktok_base_url: optional_url("TIKTOK_BASE_URL", "https://open.tiktokapis.com")?,
            google_maps_api_key: required("GOOGLE_MAPS_API_KEY")?,
            google_maps_base_url: optional_url(
                "GOOGLE_MAPS_BASE_URL",
                "https://maps.googleapis.com",
            )?,
        };

        // Log a redacted summary only; keys never hit the logs in full
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server port: {}", config.port);
        if config.alert_webhook_url.is_some() {
            tracing::info!("Alert webhook configured");
        }

        Ok(config)
    }
}
