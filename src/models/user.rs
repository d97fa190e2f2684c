use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Organiser-side user account. `can_approve_tickets` gates the QR
/// check-in interrupt; regular buyers have no user row at all.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub organiser_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub can_approve_tickets: bool,
    pub deleted: bool,
}
