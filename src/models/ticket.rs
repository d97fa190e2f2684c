use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub type_name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency_code: String,
    pub available_quantity: i32,
    pub deleted: bool,
}

impl TicketType {
    /// Price `0.00` marks a free/registration ticket type, which skips
    /// the payment protocol entirely.
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub name_on_ticket: String,
    pub checked_in: bool,
    pub qr_code: String,
    pub price_paid: Decimal,
    pub email: String,
    pub phone: String,
    pub deleted: bool,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for an INSERT; id, qr_code and timestamps are generated by
/// the store.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub name_on_ticket: String,
    pub price_paid: Decimal,
    pub email: String,
    pub phone: String,
    pub payment_status: String,
}

/// A ticket denormalized with the event and ticket-type details the
/// rendering and delivery pipeline needs in one shape.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub name_on_ticket: String,
    pub checked_in: bool,
    pub qr_code: String,
    pub price_paid: Decimal,
    pub payment_status: String,
    pub event_title: String,
    pub event_description: Option<String>,
    pub event_start: DateTime<Utc>,
    pub event_end: Option<DateTime<Utc>>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub ticket_type_name: String,
    pub organiser_name: String,
}
