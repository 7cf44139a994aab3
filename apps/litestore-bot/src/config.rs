//! Bot configuration.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

const DEFAULT_OPS_GROUP_FILE: &str = "/etc/bot/.bot.db";
const DEFAULT_MUTATION_URL: &str = "https://mutasiv1.vercel.app/check-payment";
const DEFAULT_RENDER_URL: &str = "https://api.qrserver.com/v1/create-qr-code/?size=500x500&data=";
const DEFAULT_SAWERIA_URL: &str = "https://saweria-pg.vercel.app";
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Group bot credentials for topup announcements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsGroup {
    pub token: String,
    pub chat_id: String,
}

/// Configuration loaded from environment variables and the ops key file.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    pub admin_ids: Vec<i64>,
    pub store_name: String,

    /// Merchant's static QRIS string; amounts are injected per deposit.
    pub qris_static_payload: String,
    pub qris_merchant_id: String,
    pub qris_api_key: String,
    pub qris_mutation_url: String,
    pub qris_render_url: String,

    pub saweria_base_url: String,
    pub saweria_username: String,
    pub saweria_email: String,

    pub ops_group: Option<OpsGroup>,
    pub telegram_api_url: String,

    pub poll_interval_secs: u64,
    pub deposit_expiry_secs: i64,
    pub max_pending_per_user: usize,
    pub create_cooldown_ms: u64,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} is not set", name))
}

pub fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Finds the `#bot# <token> <chat_id>` line in the ops key file.
pub fn parse_ops_group(content: &str) -> Option<OpsGroup> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next()? != "#bot#" {
            return None;
        }
        let token = parts.next()?.to_string();
        let chat_id = parts.next()?.to_string();
        Some(OpsGroup { token, chat_id })
    })
}

/// Explicit env vars win over the key file.
fn load_ops_group(path: &str) -> Option<OpsGroup> {
    if let (Ok(token), Ok(chat_id)) = (
        std::env::var("OPS_GROUP_TOKEN"),
        std::env::var("OPS_GROUP_CHAT_ID"),
    ) {
        if !token.is_empty() && !chat_id.is_empty() {
            return Some(OpsGroup { token, chat_id });
        }
    }

    if !Path::new(path).exists() {
        warn!("Ops group key file {} not found, group notifications disabled", path);
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let group = parse_ops_group(&content);
            if group.is_none() {
                warn!("No #bot# line in {}, group notifications disabled", path);
            } else {
                info!("Loaded ops group from {}", path);
            }
            group
        }
        Err(e) => {
            warn!("Failed to read ops group key file {}: {}", path, e);
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ops_group_file = var_or("OPS_GROUP_FILE", DEFAULT_OPS_GROUP_FILE);

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            admin_ids: parse_admin_ids(&var_or("ADMIN_IDS", "")),
            store_name: var_or("STORE_NAME", "LITESTORE"),
            qris_static_payload: var_or("QRIS_STATIC_PAYLOAD", ""),
            qris_merchant_id: var_or("QRIS_MERCHANT_ID", ""),
            qris_api_key: var_or("QRIS_API_KEY", ""),
            qris_mutation_url: var_or("QRIS_MUTATION_URL", DEFAULT_MUTATION_URL),
            qris_render_url: var_or("QRIS_RENDER_URL", DEFAULT_RENDER_URL),
            saweria_base_url: var_or("SAWERIA_BASE_URL", DEFAULT_SAWERIA_URL),
            saweria_username: var_or("SAWERIA_USERNAME", ""),
            saweria_email: var_or("SAWERIA_EMAIL", ""),
            ops_group: load_ops_group(&ops_group_file),
            telegram_api_url: var_or("TELEGRAM_API_URL", DEFAULT_TELEGRAM_API),
            poll_interval_secs: parsed_or::<u64>("POLL_INTERVAL_SECS", 10).max(1),
            deposit_expiry_secs: parsed_or::<i64>("DEPOSIT_EXPIRY_SECS", 300).max(60),
            max_pending_per_user: parsed_or::<usize>("MAX_PENDING_PER_USER", 3).max(1),
            create_cooldown_ms: parsed_or("CREATE_COOLDOWN_MS", 1000),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn qris_configured(&self) -> bool {
        !self.qris_static_payload.is_empty()
            && !self.qris_merchant_id.is_empty()
            && !self.qris_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_bot_line_among_other_entries() {
        let content = "### alice 2025-01-01\n#bot# 123:ABC -100200300\n#other# x y\n";
        assert_eq!(
            parse_ops_group(content),
            Some(OpsGroup {
                token: "123:ABC".into(),
                chat_id: "-100200300".into(),
            })
        );
    }

    #[test]
    fn incomplete_bot_line_is_ignored() {
        assert_eq!(parse_ops_group("#bot# onlytoken\n"), None);
        assert_eq!(parse_ops_group(""), None);
    }

    #[test]
    fn admin_ids_skip_garbage() {
        assert_eq!(parse_admin_ids("1, 2,abc,,3"), vec![1, 2, 3]);
        assert!(parse_admin_ids("").is_empty());
    }
}
