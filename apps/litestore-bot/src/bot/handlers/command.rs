use litestore_db::models::{BonusLogEntry, TopupLogEntry, TopupMethod, TopupMethods};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, error, info, warn};

use crate::bot::handlers::{display_username, topup_methods};
use crate::bot::keyboards::{main_menu, topup_menu};
use crate::bot::utils::{escape_html, format_rupiah};
use crate::services::bonus_service::{describe_config, parse_bonus_setting};
use crate::services::input_service::TopupMode;
use crate::state::AppState;

const LOG_PAGE: i64 = 15;

pub fn main_menu_text(store_name: &str, balance: i64) -> String {
    format!(
        "👋 <b>Welcome to {}</b>\n\n💰 Balance: <b>{}</b>\n\nTop up your balance to buy VPN accounts and scripts.",
        escape_html(store_name),
        format_rupiah(balance)
    )
}

pub fn topup_menu_text() -> &'static str {
    "💸 <b>Top Up Balance</b>\n\nChoose a payment method:"
}

fn format_bonus_log(entries: &[BonusLogEntry]) -> String {
    if entries.is_empty() {
        return "No bonus has been granted yet.".to_string();
    }
    let mut text = String::from("🎁 <b>Recent topup bonuses</b>\n\n");
    for e in entries {
        text.push_str(&format!(
            "• {} <code>{}</code> {}: +{} ({})\n",
            e.timestamp.format("%Y-%m-%d %H:%M"),
            e.user_id,
            escape_html(e.username.as_deref().unwrap_or("-")),
            format_rupiah(e.bonus),
            format_rupiah(e.amount)
        ));
    }
    text
}

fn format_topup_log(entries: &[TopupLogEntry]) -> String {
    if entries.is_empty() {
        return "No topups yet.".to_string();
    }
    let mut text = String::from("🧾 <b>Recent topups</b>\n\n");
    for e in entries {
        text.push_str(&format!(
            "• {} <code>{}</code> {}: {} via {}\n",
            e.waktu.format("%Y-%m-%d %H:%M"),
            e.user_id,
            escape_html(e.username.as_deref().unwrap_or("-")),
            format_rupiah(e.amount),
            escape_html(&e.method)
        ));
    }
    text
}

pub fn describe_topup_methods(methods: &TopupMethods) -> String {
    let mark = |on: bool| if on { "✅ ON" } else { "❌ OFF" };
    format!(
        "⚙️ <b>Topup methods</b>\n\nQRIS Orkut: <b>{}</b>\nQRIS Saweria: <b>{}</b>\n\nToggle with /topupmethod qris|saweria",
        mark(methods.qris_enabled),
        mark(methods.saweria_enabled)
    )
}

/// `/addsaldo <user_id> <amount>`; the amount may be negative.
pub fn parse_add_balance(args: &str) -> Option<(i64, i64)> {
    let mut parts = args.split_whitespace();
    let user_id = parts.next()?.parse().ok()?;
    let amount = parts.next()?.parse().ok()?;
    if parts.next().is_some() || amount == 0 {
        return None;
    }
    Some((user_id, amount))
}

async fn reply(bot: &Bot, msg: &Message, text: String) {
    if let Err(e) = bot
        .send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!("Failed to send reply: {}", e);
    }
}

pub async fn message_handler(bot: Bot, msg: Message, state: AppState) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let tg_id = user.id.0 as i64;
    let (command, args) = match text.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (text, ""),
    };
    // Strip a `@botname` suffix.
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => {
            state.input.cancel(tg_id).await;
            if let Err(e) = state.ledger.ensure_user(tg_id).await {
                error!(user_id = tg_id, "Failed to register user: {:#}", e);
            }
            let balance = state.ledger.balance(tg_id).await.unwrap_or(0);
            let _ = bot
                .send_message(msg.chat.id, main_menu_text(&state.config.store_name, balance))
                .parse_mode(ParseMode::Html)
                .reply_markup(main_menu())
                .await;
        }
        "/topup" => {
            state.input.cancel(tg_id).await;
            let _ = bot
                .send_message(msg.chat.id, topup_menu_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(topup_menu(&topup_methods(&state).await))
                .await;
        }
        "/saweria" => {
            if let Err(e) = state.input.begin(tg_id, msg.chat.id.0, TopupMode::Saweria).await {
                warn!(user_id = tg_id, "Failed to open amount prompt: {}", e);
                reply(&bot, &msg, e.user_message()).await;
            }
        }
        "/saldo" => match state.ledger.balance(tg_id).await {
            Ok(balance) => {
                reply(&bot, &msg, format!("💰 Your balance: <b>{}</b>", format_rupiah(balance))).await;
            }
            Err(e) => {
                error!(user_id = tg_id, "Failed to read balance: {:#}", e);
                reply(&bot, &msg, "❌ Failed to read your balance. Please try again later.".into()).await;
            }
        },
        "/bonus" | "/bonuslog" | "/topuplog" | "/addsaldo" | "/topupmethod" if !state.config.is_admin(tg_id) => {
            reply(&bot, &msg, "⛔ This command is for admins only.".into()).await;
        }
        "/bonus" => {
            if args.is_empty() {
                match state.ledger.bonus_config().await {
                    Ok(config) => reply(&bot, &msg, describe_config(&config)).await,
                    Err(e) => error!("Failed to read bonus config: {:#}", e),
                }
                return Ok(());
            }
            match parse_bonus_setting(args) {
                Ok(config) => match state.ledger.set_bonus_config(&config).await {
                    Ok(()) => {
                        info!(admin = tg_id, ?config, "Bonus config updated");
                        reply(&bot, &msg, format!("✅ Saved.\n\n{}", describe_config(&config))).await;
                    }
                    Err(e) => {
                        error!("Failed to save bonus config: {:#}", e);
                        reply(&bot, &msg, "❌ Failed to save bonus settings.".into()).await;
                    }
                },
                Err(usage) => reply(&bot, &msg, format!("⚠️ {}", escape_html(&usage))).await,
            }
        }
        "/topupmethod" => {
            if args.is_empty() {
                let methods = topup_methods(&state).await;
                reply(&bot, &msg, describe_topup_methods(&methods)).await;
                return Ok(());
            }
            let Ok(method) = args.parse::<TopupMethod>() else {
                reply(&bot, &msg, "Format: /topupmethod qris|saweria".into()).await;
                return Ok(());
            };
            match state.ledger.toggle_topup_method(method).await {
                Ok(methods) => {
                    info!(admin = tg_id, %method, enabled = methods.is_enabled(method), "Topup method toggled by admin");
                    reply(&bot, &msg, describe_topup_methods(&methods)).await;
                }
                Err(e) => {
                    error!("Failed to toggle topup method: {:#}", e);
                    reply(&bot, &msg, "❌ Failed to update topup methods.".into()).await;
                }
            }
        }
        "/bonuslog" => match state.ledger.recent_bonus_log(LOG_PAGE).await {
            Ok(entries) => reply(&bot, &msg, format_bonus_log(&entries)).await,
            Err(e) => error!("Failed to read bonus log: {:#}", e),
        },
        "/topuplog" => match state.ledger.recent_topup_log(LOG_PAGE).await {
            Ok(entries) => reply(&bot, &msg, format_topup_log(&entries)).await,
            Err(e) => error!("Failed to read topup log: {:#}", e),
        },
        "/addsaldo" => {
            let Some((target, amount)) = parse_add_balance(args) else {
                reply(&bot, &msg, "Format: /addsaldo &lt;user_id&gt; &lt;amount&gt;".into()).await;
                return Ok(());
            };
            match state.ledger.adjust_balance(target, amount).await {
                Ok(Some(balance)) => {
                    info!(admin = tg_id, user_id = target, amount, balance, "Balance adjusted by admin");
                    reply(
                        &bot,
                        &msg,
                        format!(
                            "✅ Balance of <code>{}</code> is now <b>{}</b>",
                            target,
                            format_rupiah(balance)
                        ),
                    )
                    .await;
                }
                Ok(None) => reply(&bot, &msg, "⚠️ Balance cannot go below zero.".into()).await,
                Err(e) => {
                    error!(user_id = target, "Failed to adjust balance: {:#}", e);
                    reply(&bot, &msg, "❌ Failed to adjust balance.".into()).await;
                }
            }
        }
        _ => {
            debug!(user_id = tg_id, username = ?display_username(user), "Ignoring message");
        }
    }

    Ok(())
}
