use uuid::Uuid;

use crate::utils::error::{BotError, BotResult};

pub const MAX_TICKET_QUANTITY: u32 = 10;

/// Convert a `263…` international number to local trunk form (`0…`).
pub fn normalize_phone(phone: &str) -> String {
    match phone.strip_prefix("263") {
        Some(rest) => format!("0{rest}"),
        None => phone.to_string(),
    }
}

/// Zimbabwean mobile number: `263` followed by 9 digits, or `0` followed
/// by 9 digits. Whitespace, dashes and parentheses are stripped first.
pub fn validate_payment_phone(raw: &str) -> BotResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();

    let valid = if let Some(rest) = cleaned.strip_prefix("263") {
        rest.len() == 9 && rest.chars().all(|c| c.is_ascii_digit())
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        rest.len() == 9 && rest.chars().all(|c| c.is_ascii_digit())
    } else {
        false
    };

    if valid {
        Ok(cleaned)
    } else {
        Err(BotError::Validation("Invalid phone number format".into()))
    }
}

/// A syntactically valid v4 UUID in free text is treated as a ticket
/// QR scan, whatever state the conversation is in.
pub fn is_qr_token(text: &str) -> bool {
    matches!(Uuid::parse_str(text.trim()), Ok(id) if id.get_version_num() == 4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Parsed fine but over the per-transaction limit.
    OverLimit,
    /// Not a number, zero, or negative.
    Invalid,
}

pub fn parse_quantity(text: &str) -> Result<u32, QuantityError> {
    let qty: i64 = text.trim().parse().map_err(|_| QuantityError::Invalid)?;
    if qty < 1 {
        Err(QuantityError::Invalid)
    } else if qty > i64::from(MAX_TICKET_QUANTITY) {
        Err(QuantityError::OverLimit)
    } else {
        Ok(qty as u32)
    }
}

/// Strip characters we never want to echo back or persist, and cap length.
pub fn sanitize_input(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}'))
        .collect();
    let trimmed = cleaned.trim();
    trimmed.chars().take(1000).collect()
}
