//! Dynamic QRIS payloads.
//!
//! A merchant's static QRIS string is an EMV TLV payload ending in a CRC
//! (`6304XXXX`). Turning it into a fixed-amount QR means marking it dynamic
//! (`010211` -> `010212`), inserting the transaction amount tag `54` before
//! the country code tag `58`, and recomputing the CRC.

use super::GatewayError;

/// CRC-16/CCITT-FALSE, the checksum carried in EMV QR tag 63.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

pub fn dynamic_payload(static_payload: &str, amount: i64) -> Result<String, GatewayError> {
    let trimmed = static_payload.trim();
    if amount <= 0 {
        return Err(GatewayError::Malformed(format!("amount must be positive, got {}", amount)));
    }
    if trimmed.len() < 8 || !trimmed.is_char_boundary(trimmed.len() - 4) {
        return Err(GatewayError::Malformed("static QRIS payload is too short".into()));
    }

    // Drop the old CRC value but keep its "6304" tag header.
    let body = &trimmed[..trimmed.len() - 4];
    if !body.ends_with("6304") {
        return Err(GatewayError::Malformed("static QRIS payload has no CRC tag".into()));
    }
    let body = body.replacen("010211", "010212", 1);

    let (head, tail) = body
        .split_once("5802ID")
        .ok_or_else(|| GatewayError::Malformed("static QRIS payload has no country tag".into()))?;

    let amount = amount.to_string();
    let payload = format!("{}54{:02}{}5802ID{}", head, amount.len(), amount, tail);
    let crc = crc16_ccitt(payload.as_bytes());
    Ok(format!("{}{:04X}", payload, crc))
}
