use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub root_folder_id: String,
    pub service_account_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub store_domain: String,
    pub access_token: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub admin_jwt_secret: String,
    pub image_base_url: String,
    pub sync_state_path: PathBuf,
    pub price_map_path: PathBuf,
    pub drive: Option<DriveConfig>,
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub shopify: Option<ShopifyConfig>,
    pub webhook_secret: Option<String>,
    pub printful_api_key: Option<String>,
    pub auto_fulfill: bool,
    pub push_tags: bool,
    pub watch_interval_secs: u64,
    pub nightly_ingest_hour: u32,
    pub nightly_sync_hour: u32,
    pub nightly_sync_cap: u64,
}

fn var(name: &'static str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn var_or(name: &'static str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

/// Like [`var_or`], but the value must be an absolute http(s) URL.
fn url_or(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = var_or(name, default);
    match url::Url::parse(&raw) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(raw.trim_end_matches('/').to_string()),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

fn flag(name: &'static str) -> bool {
    matches!(var(name).as_deref(), Some("1" | "true" | "yes" | "on"))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let drive = match (var("DRIVE_ROOT_FOLDER_ID"), var("GOOGLE_SERVICE_ACCOUNT_PATH")) {
            (Some(root_folder_id), Some(path)) => Some(DriveConfig {
                root_folder_id,
                service_account_path: PathBuf::from(path),
            }),
            _ => None,
        };

        let llm = match var("LLM_API_KEY") {
            Some(api_key) => Some(LlmConfig {
                api_url: url_or("LLM_API_URL", "https://api.openai.com/v1/chat/completions")?,
                api_key,
                model: var_or("LLM_MODEL", "gpt-4o-mini"),
            }),
            None => None,
        };

        let embedding = var("EMBEDDING_API_KEY").map(|api_key| EmbeddingConfig {
            api_key,
            model: var_or("EMBEDDING_MODEL", "text-embedding-004"),
        });

        let shopify = match (var("SHOPIFY_STORE_DOMAIN"), var("SHOPIFY_ACCESS_TOKEN")) {
            (Some(store_domain), Some(access_token)) => Some(ShopifyConfig {
                store_domain,
                access_token,
                api_version: var_or("SHOPIFY_API_VERSION", "2024-10"),
            }),
            _ => None,
        };

        let nightly_ingest_hour = parsed("NIGHTLY_INGEST_HOUR", 2u32)?;
        let nightly_sync_hour = parsed("NIGHTLY_SYNC_HOUR", 4u32)?;
        for (name, hour) in [
            ("NIGHTLY_INGEST_HOUR", nightly_ingest_hour),
            ("NIGHTLY_SYNC_HOUR", nightly_sync_hour),
        ] {
            if hour > 23 {
                return Err(ConfigError::Invalid { name, value: hour.to_string() });
            }
        }

        Ok(Self {
            database_url,
            listen_addr: parsed("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            admin_jwt_secret: var("ADMIN_JWT_SECRET").ok_or(ConfigError::Missing("ADMIN_JWT_SECRET"))?,
            image_base_url: url_or("IMAGE_BASE_URL", "https://lh3.googleusercontent.com/d")?,
            sync_state_path: PathBuf::from(var_or("SYNC_STATE_PATH", "data/sync-state.json")),
            price_map_path: PathBuf::from(var_or("PRICE_MAP_PATH", "data/price-map.json")),
            drive,
            llm,
            embedding,
            shopify,
            webhook_secret: var("SHOPIFY_WEBHOOK_SECRET"),
            printful_api_key: var("PRINTFUL_API_KEY"),
            auto_fulfill: flag("AUTO_FULFILL"),
            push_tags: flag("PUSH_TAGS"),
            watch_interval_secs: parsed("WATCH_INTERVAL_SECS", 300u64)?,
            nightly_ingest_hour,
            nightly_sync_hour,
            nightly_sync_cap: parsed("NIGHTLY_SYNC_CAP", 900u64)?,
        })
    }
}

impl Config {
    /// Minimal configuration with every external service disabled.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_jwt_secret: "test-secret".into(),
            image_base_url: "https://img.example.com".into(),
            sync_state_path: PathBuf::from("sync-state.json"),
            price_map_path: PathBuf::from("price-map.json"),
            drive: None,
            llm: None,
            embedding: None,
            shopify: None,
            webhook_secret: Some("whsec".into()),
            printful_api_key: None,
            auto_fulfill: false,
            push_tags: false,
            watch_interval_secs: 300,
            nightly_ingest_hour: 2,
            nightly_sync_hour: 4,
            nightly_sync_cap: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_validated_and_trimmed() {
        assert_eq!(url_or("PRINTVAULT_TEST_UNSET_URL", "https://img.example/").unwrap(), "https://img.example");

        env::set_var("PRINTVAULT_TEST_BAD_URL", "ftp://files.example");
        assert!(matches!(
            url_or("PRINTVAULT_TEST_BAD_URL", "https://x.example"),
            Err(ConfigError::Invalid { name: "PRINTVAULT_TEST_BAD_URL", .. })
        ));
    }
}
