use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub mortech_endpoint: String,
    pub mortech_license_key: String,
    pub mortech_third_party_name: String,
    pub mortech_customer_id: String,
    pub mortech_email: String,
    pub save_mortech_response: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            mortech_endpoint: std::env::var("MORTECH_ENDPOINT")
                .unwrap_or_else(|_| {
                    "https://thirdparty.mortech-inc.com/mpg/servlet/mpgThirdPartyServlet"
                        .to_string()
                })
                .trim()
                .to_string(),
            mortech_license_key: std::env::var("MORTECH_LICENSE_KEY")
                .map_err(|_| anyhow::anyhow!("MORTECH_LICENSE_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("MORTECH_LICENSE_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            mortech_third_party_name: std::env::var("MORTECH_THIRD_PARTY_NAME").map_err(|_| {
                anyhow::anyhow!("MORTECH_THIRD_PARTY_NAME environment variable required")
            })?,
            mortech_customer_id: std::env::var("MORTECH_CUSTOMER_ID")
                .map_err(|_| anyhow::anyhow!("MORTECH_CUSTOMER_ID environment variable required"))?,
            mortech_email: std::env::var("MORTECH_EMAIL")
                .map_err(|_| anyhow::anyhow!("MORTECH_EMAIL environment variable required"))?,
            save_mortech_response: std::env::var("SAVE_MORTECH_RESPONSE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        if config.mortech_endpoint.is_empty()
            || (!config.mortech_endpoint.starts_with("http://")
                && !config.mortech_endpoint.starts_with("https://"))
        {
            anyhow::bail!("MORTECH_ENDPOINT must start with http:// or https://");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Mortech endpoint: {}", config.mortech_endpoint);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
