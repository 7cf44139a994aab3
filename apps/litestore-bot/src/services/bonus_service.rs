use litestore_db::models::BonusConfig;

use crate::bot::utils::format_rupiah;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BonusOutcome {
    pub bonus: i64,
    /// Percent actually applied; zero when no bonus was granted.
    pub percent: i32,
}

/// Promotional bonus for a topup of `amount` under `config`.
pub fn compute_bonus(amount: i64, config: &BonusConfig) -> BonusOutcome {
    if !config.enabled || amount < config.min_topup || config.bonus_percent <= 0 || amount <= 0 {
        return BonusOutcome::default();
    }
    let bonus = amount.saturating_mul(i64::from(config.bonus_percent)) / 100;
    if bonus == 0 {
        return BonusOutcome::default();
    }
    BonusOutcome {
        bonus,
        percent: config.bonus_percent,
    }
}

/// Parses the admin setting `on|off <min_topup> <percent>`, e.g. `on 10000 25`.
pub fn parse_bonus_setting(args: &str) -> Result<BonusConfig, String> {
    const USAGE: &str = "Format: on|off <min_topup> <bonus_percent>, e.g. on 10000 25";

    let parts: Vec<&str> = args.split_whitespace().collect();
    let [switch, min, percent] = parts.as_slice() else {
        return Err(USAGE.to_string());
    };
    let enabled = match switch.to_ascii_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => return Err(USAGE.to_string()),
    };
    let min_topup = min.parse::<i64>().map_err(|_| USAGE.to_string())?;
    let bonus_percent = percent
        .trim_end_matches('%')
        .parse::<i32>()
        .map_err(|_| USAGE.to_string())?;

    let config = BonusConfig {
        enabled,
        min_topup,
        bonus_percent,
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn describe_config(config: &BonusConfig) -> String {
    format!(
        "🎁 <b>Topup bonus</b>\n\nStatus: <b>{}</b>\nMinimum topup: <b>{}</b>\nBonus: <b>{}%</b>",
        if config.enabled { "ON" } else { "OFF" },
        format_rupiah(config.min_topup),
        config.bonus_percent
    )
}
