use litestore_db::models::TopupMethods;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const CB_DELETE: &str = "delete";
pub const CB_CONFIRM: &str = "confirm";
pub const CB_CANCEL_INPUT: &str = "cancel_input";
pub const CB_TOPUP_MENU: &str = "menu_topup";
pub const CB_TOPUP_QRIS: &str = "topup_qris";
pub const CB_TOPUP_SAWERIA: &str = "topup_saweria";
pub const CB_MAIN_MENU: &str = "send_main_menu";
pub const CANCEL_QRIS_PREFIX: &str = "batal_topup_";
pub const CANCEL_SAWERIA_PREFIX: &str = "batal_saweria_";

/// Digit keypad used by the amount collector.
pub fn amount_keypad() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = "1234567890"
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .map(|d| InlineKeyboardButton::callback(d.to_string(), d.to_string()))
                .collect()
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback("🔙 Delete", CB_DELETE),
        InlineKeyboardButton::callback("✅ Confirm", CB_CONFIRM),
    ]);
    rows.push(vec![InlineKeyboardButton::callback("❌ Cancel", CB_CANCEL_INPUT)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "💸 Top Up Balance",
        CB_TOPUP_MENU,
    )]])
}

/// Only the methods an admin left switched on are offered.
pub fn topup_menu(methods: &TopupMethods) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if methods.qris_enabled {
        rows.push(vec![InlineKeyboardButton::callback("💳 QRIS (automatic)", CB_TOPUP_QRIS)]);
    }
    if methods.saweria_enabled {
        rows.push(vec![InlineKeyboardButton::callback("💠 QRIS Saweria", CB_TOPUP_SAWERIA)]);
    }
    rows.push(vec![InlineKeyboardButton::callback("📝 Main Menu", CB_MAIN_MENU)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn cancel_qris(unique_code: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "❌ Cancel Topup",
        format!("{}{}", CANCEL_QRIS_PREFIX, unique_code),
    )]])
}

pub fn cancel_saweria(transaction_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "❌ Cancel Topup",
        format!("{}{}", CANCEL_SAWERIA_PREFIX, transaction_id),
    )]])
}

pub fn after_topup() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("💸 Top Up", CB_TOPUP_MENU),
        InlineKeyboardButton::callback("📝 Main Menu", CB_MAIN_MENU),
    ]])
}

pub fn back_to_topup() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔙 Back to Top-up Menu",
        CB_TOPUP_MENU,
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_has_every_digit_once() {
        let kb = amount_keypad();
        let digits: Vec<String> = kb
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.text.clone())
            .filter(|t| t.len() == 1)
            .collect();
        assert_eq!(digits.concat(), "1234567890");
    }

    fn callbacks(kb: &InlineKeyboardMarkup) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn topup_menu_hides_disabled_methods() {
        let all = callbacks(&topup_menu(&TopupMethods::default()));
        assert!(all.contains(&CB_TOPUP_QRIS.to_string()));
        assert!(all.contains(&CB_TOPUP_SAWERIA.to_string()));

        let qris_only = TopupMethods {
            qris_enabled: true,
            saweria_enabled: false,
        };
        let shown = callbacks(&topup_menu(&qris_only));
        assert!(shown.contains(&CB_TOPUP_QRIS.to_string()));
        assert!(!shown.contains(&CB_TOPUP_SAWERIA.to_string()));
        assert!(shown.contains(&CB_MAIN_MENU.to_string()));
    }
}
