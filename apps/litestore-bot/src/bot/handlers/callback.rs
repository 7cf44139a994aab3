use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ParseMode};
use tracing::{debug, warn};

use crate::bot::handlers::command::{main_menu_text, topup_menu_text};
use crate::bot::handlers::{display_username, topup_methods};
use crate::bot::keyboards::{self, main_menu, topup_menu};
use crate::error::DepositError;
use crate::services::input_service::{KeypadEvent, KeypadReply, TopupMode};
use crate::state::AppState;

async fn alert(bot: &Bot, q: &CallbackQuery, text: &str) {
    let _ = bot
        .answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await;
}

pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: AppState) -> Result<(), teloxide::RequestError> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let tg_id = q.from.id.0 as i64;
    let chat_id = q.message.as_ref().map(|m| m.chat().id.0).unwrap_or(tg_id);
    debug!(user_id = tg_id, data = %data, "Received callback");

    if let Some(event) = KeypadEvent::parse(&data) {
        match state.input.handle(tg_id, display_username(&q.from), event).await {
            KeypadReply::Alert(text) => alert(&bot, &q, &text).await,
            KeypadReply::NoSession => {
                alert(&bot, &q, "This keypad has expired. Start a new topup from the menu.").await
            }
            _ => {
                let _ = bot.answer_callback_query(q.id.clone()).await;
            }
        }
        return Ok(());
    }

    if let Some(code) = data.strip_prefix(keyboards::CANCEL_QRIS_PREFIX) {
        match state.deposits.cancel(code, tg_id).await {
            Ok(_) => {
                let _ = bot.answer_callback_query(q.id.clone()).text("Topup cancelled").await;
            }
            Err(e) => alert(&bot, &q, &e.user_message()).await,
        }
        return Ok(());
    }

    if let Some(transaction_id) = data.strip_prefix(keyboards::CANCEL_SAWERIA_PREFIX) {
        match state.saweria.cancel(transaction_id, tg_id).await {
            Ok(_) => {
                let _ = bot.answer_callback_query(q.id.clone()).text("Topup cancelled").await;
            }
            Err(DepositError::AlreadyProcessed) => {
                alert(&bot, &q, "Payment received, your balance is being credited.").await
            }
            Err(e) => alert(&bot, &q, &e.user_message()).await,
        }
        return Ok(());
    }

    let _ = bot.answer_callback_query(q.id.clone()).await;

    match data.as_str() {
        keyboards::CB_CANCEL_INPUT | keyboards::CB_TOPUP_MENU => {
            state.input.cancel(tg_id).await;
            let _ = bot
                .send_message(ChatId(chat_id), topup_menu_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(topup_menu(&topup_methods(&state).await))
                .await;
        }
        keyboards::CB_TOPUP_QRIS | keyboards::CB_TOPUP_SAWERIA => {
            let mode = if data == keyboards::CB_TOPUP_QRIS {
                TopupMode::Qris
            } else {
                TopupMode::Saweria
            };
            if let Err(e) = state.input.begin(tg_id, chat_id, mode).await {
                warn!(user_id = tg_id, "Failed to open amount prompt: {}", e);
                let _ = bot
                    .send_message(ChatId(chat_id), e.user_message())
                    .parse_mode(ParseMode::Html)
                    .await;
            }
        }
        keyboards::CB_MAIN_MENU => {
            let balance = state.ledger.balance(tg_id).await.unwrap_or(0);
            let _ = bot
                .send_message(ChatId(chat_id), main_menu_text(&state.config.store_name, balance))
                .parse_mode(ParseMode::Html)
                .reply_markup(main_menu())
                .await;
        }
        other => debug!(user_id = tg_id, data = other, "Unknown callback"),
    }

    Ok(())
}
