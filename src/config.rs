//! Runtime configuration for the order relay.
//!
//! Everything that was a literal in earlier deployments — printer endpoints,
//! the Telegram bot credential, chat identifiers, data directories — is
//! injected here. Loaded from a JSON file; the bot token can additionally be
//! overridden through `ORDER_RELAY_BOT_TOKEN` so the credential never has to
//! live in the config file at all.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::RoutingTarget;

/// Environment variable overriding `telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "ORDER_RELAY_BOT_TOKEN";

/// Default outbound timeout for one printer delivery (seconds).
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 15;

/// Default timeout for notification sends (seconds).
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Default timeout for the daily backup upload (seconds). Backups can be
/// large, so this is deliberately generous.
const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Config shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database. Archived by the backup job.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory of uploaded assets (product images). Archived by the backup
    /// job; this crate never writes to it.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Routing target -> print endpoint URL. A destination missing from this
    /// map fails dispatch for its batch (it does not abort the others).
    #[serde(default)]
    pub printers: BTreeMap<RoutingTarget, String>,

    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Bound on one outbound printer call so a single unreachable destination
    /// cannot stall the whole request.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,

    #[serde(default = "default_backup_timeout")]
    pub backup_timeout_secs: u64,
}

/// Telegram credentials and channels. The same bot serves both the order
/// notification channel and the backup channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// API base, normally `https://api.telegram.org`. Overridable so tests
    /// and staging can point at a stub server.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: String,
    /// Chat receiving order summaries.
    #[serde(default)]
    pub orders_chat_id: String,
    /// Chat receiving the daily backup bundle.
    #[serde(default)]
    pub backup_chat_id: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_dispatch_timeout() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_SECS
}

fn default_notify_timeout() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

fn default_backup_timeout() -> u64 {
    DEFAULT_BACKUP_TIMEOUT_SECS
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            uploads_dir: default_uploads_dir(),
            log_dir: default_log_dir(),
            printers: BTreeMap::new(),
            telegram: TelegramConfig {
                api_base: default_telegram_api_base(),
                ..TelegramConfig::default()
            },
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            notify_timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            backup_timeout_secs: DEFAULT_BACKUP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, normalise endpoint URLs and apply
    /// environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        let mut config: Config = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;
        config.finalize();
        Ok(config)
    }

    /// Normalise endpoints and pull in environment overrides. Called by
    /// [`Config::load`]; exposed for configs built in code.
    pub fn finalize(&mut self) {
        for endpoint in self.printers.values_mut() {
            *endpoint = normalize_endpoint(endpoint);
        }
        self.telegram.api_base = normalize_endpoint(&self.telegram.api_base);
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.telegram.bot_token = token.trim().to_string();
            }
        }
    }

}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise an endpoint URL:
/// - strip surrounding whitespace and trailing slashes
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_endpoint(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn normalize_adds_scheme_and_strips_slashes() {
        assert_eq!(
            normalize_endpoint("printer1.example.uz/print/"),
            "https://printer1.example.uz/print"
        );
        assert_eq!(
            normalize_endpoint("localhost:8080/print"),
            "http://localhost:8080/print"
        );
        assert_eq!(
            normalize_endpoint("  https://api.telegram.org// "),
            "https://api.telegram.org"
        );
        assert_eq!(normalize_endpoint(""), "");
    }

    #[test]
    #[serial]
    fn load_applies_defaults_normalisation_and_env_override() {
        let dir = std::env::temp_dir().join(format!("order-relay-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{
                "printers": { "1": "printer1.example.uz/print/" },
                "telegram": { "orders_chat_id": "-400123", "backup_chat_id": "-400124" }
            }"#,
        )
        .expect("write config");

        std::env::set_var(BOT_TOKEN_ENV, "123:abc");
        let config = Config::load(&path).expect("load config");
        std::env::remove_var(BOT_TOKEN_ENV);

        assert_eq!(
            config.printers.get(&1).map(String::as_str),
            Some("https://printer1.example.uz/print")
        );
        assert_eq!(config.printers.get(&2), None);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.dispatch_timeout_secs, 15);
        assert_eq!(config.data_dir, PathBuf::from("data"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    #[serial]
    fn blank_env_token_does_not_clobber_file_token() {
        std::env::set_var(BOT_TOKEN_ENV, "   ");
        let mut config = Config::default();
        config.telegram.bot_token = "file-token".into();
        config.finalize();
        std::env::remove_var(BOT_TOKEN_ENV);
        assert_eq!(config.telegram.bot_token, "file-token");
    }
}
