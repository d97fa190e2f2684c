use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An event row joined with its organiser name, as offered to buyers.
/// Only rows with `is_active && !deleted && !sold_out` ever reach a
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organiser_id: Uuid,
    pub organiser_name: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub is_active: bool,
    pub sold_out: bool,
    pub deleted: bool,
    pub approve_tickets: bool,
    pub ticket_delivery_method: String,
}

impl Event {
    pub fn requires_collection(&self) -> bool {
        self.ticket_delivery_method == "collection"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub category_name: String,
    pub deleted: bool,
}
