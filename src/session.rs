use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Event, TicketRecord, TicketType};
use crate::utils::error::BotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Ecocash,
    Innbucks,
    Web,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Ecocash => "ecocash",
            PaymentMethod::Innbucks => "innbucks",
            PaymentMethod::Web => "web",
        }
    }

    /// Button ids carry a leading underscore (`_ecocash`).
    pub fn from_button_id(id: &str) -> Option<Self> {
        match id.trim_start_matches('_') {
            "ecocash" => Some(PaymentMethod::Ecocash),
            "innbucks" => Some(PaymentMethod::Innbucks),
            "web" => Some(PaymentMethod::Web),
            _ => None,
        }
    }
}

/// Transient purchase-flow data for one user, keyed by phone number.
/// Fields accrete as the flow advances; the whole struct survives a
/// process restart via the durable session store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub user_name: Option<String>,
    pub event: Option<Event>,
    pub events: Option<Vec<Event>>,
    pub ticket_type: Option<TicketType>,
    pub ticket_types: Option<Vec<TicketType>>,
    pub tickets: Option<Vec<TicketRecord>>,
    pub quantity: Option<u32>,
    pub total: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub phone_number: Option<String>,
    pub last_successful_state: Option<String>,
}

/// A partial session update. Only fields present in the patch are
/// written; everything else in the stored session is left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub user_name: Option<String>,
    pub event: Option<Event>,
    pub events: Option<Vec<Event>>,
    pub ticket_type: Option<TicketType>,
    pub ticket_types: Option<Vec<TicketType>>,
    pub tickets: Option<Vec<TicketRecord>>,
    pub quantity: Option<u32>,
    pub total: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub phone_number: Option<String>,
    pub last_successful_state: Option<String>,
}

impl SessionPatch {
    pub fn user_name(name: impl Into<String>) -> Self {
        SessionPatch {
            user_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn phone_number(phone: impl Into<String>) -> Self {
        SessionPatch {
            phone_number: Some(phone.into()),
            ..Default::default()
        }
    }
}

impl Session {
    pub fn apply(&mut self, patch: SessionPatch) {
        let SessionPatch {
            user_name,
            event,
            events,
            ticket_type,
            ticket_types,
            tickets,
            quantity,
            total,
            payment_method,
            phone_number,
            last_successful_state,
        } = patch;

        if let Some(v) = user_name {
            self.user_name = Some(v);
        }
        if let Some(v) = event {
            self.event = Some(v);
        }
        if let Some(v) = events {
            self.events = Some(v);
        }
        if let Some(v) = ticket_type {
            self.ticket_type = Some(v);
        }
        if let Some(v) = ticket_types {
            self.ticket_types = Some(v);
        }
        if let Some(v) = tickets {
            self.tickets = Some(v);
        }
        if let Some(v) = quantity {
            self.quantity = Some(v);
        }
        if let Some(v) = total {
            self.total = Some(v);
        }
        if let Some(v) = payment_method {
            self.payment_method = Some(v);
        }
        if let Some(v) = phone_number {
            self.phone_number = Some(v);
        }
        if let Some(v) = last_successful_state {
            self.last_successful_state = Some(v);
        }
    }

    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("there")
    }
}

/// Durable per-user purchase-flow storage. `merge` is read-modify-write
/// on the one row, never a whole-session overwrite.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lazily created: an unknown user gets a default session.
    async fn get(&self, user_id: &str) -> BotResult<Session>;

    async fn merge(&self, user_id: &str, patch: SessionPatch) -> BotResult<()>;

    /// Reset to defaults. Only used for explicit flow restarts.
    async fn reset(&self, user_id: &str) -> BotResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let mut session = Session {
            user_name: Some("Rudo".into()),
            quantity: Some(3),
            ..Default::default()
        };

        session.apply(SessionPatch::phone_number("0771234567"));

        assert_eq!(session.user_name.as_deref(), Some("Rudo"));
        assert_eq!(session.quantity, Some(3));
        assert_eq!(session.phone_number.as_deref(), Some("0771234567"));
    }

    #[test]
    fn payment_method_from_button_ids() {
        assert_eq!(
            PaymentMethod::from_button_id("_ecocash"),
            Some(PaymentMethod::Ecocash)
        );
        assert_eq!(
            PaymentMethod::from_button_id("_innbucks"),
            Some(PaymentMethod::Innbucks)
        );
        assert_eq!(PaymentMethod::from_button_id("_web"), Some(PaymentMethod::Web));
        assert_eq!(PaymentMethod::from_button_id("_visa"), None);
    }
}
