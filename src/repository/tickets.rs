use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewTicket, Ticket, TicketRecord};
use crate::utils::error::BotResult;

/// Ticket persistence plus the capacity arithmetic that goes with it.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// All non-deleted tickets bought with this phone number, joined
    /// with the event details delivery needs.
    async fn tickets_by_phone(&self, phone: &str) -> BotResult<Vec<TicketRecord>>;

    async fn find_by_qr(&self, qr_code: &str) -> BotResult<Option<Ticket>>;

    /// Mark a ticket checked in. Idempotence is enforced by the caller
    /// reading the ticket first; this only flips the flag.
    async fn check_in(&self, qr_code: &str) -> BotResult<()>;

    /// Atomically create a ticket if, and only if, the ticket type
    /// still has remaining capacity. Returns `None` when sold out.
    async fn create(&self, ticket: NewTicket) -> BotResult<Option<Ticket>>;

    /// `available_quantity - count(non-deleted tickets)` for the type.
    async fn remaining_capacity(&self, ticket_type_id: Uuid) -> BotResult<i64>;

    /// Recompute and persist the event's sold-out flag from the
    /// remaining capacity of all its ticket types.
    async fn recompute_sold_out(&self, event_id: Uuid) -> BotResult<()>;
}

const RECORD_COLUMNS: &str = r#"
    t.id, t.event_id, t.ticket_type_id, t.name_on_ticket, t.checked_in,
    t.qr_code, t.price_paid, t.payment_status,
    e.title AS event_title, e.description AS event_description,
    e.start_time AS event_start, e.end_time AS event_end,
    e.latitude, e.longitude, e.address, e.location,
    tt.type_name AS ticket_type_name, o.name AS organiser_name
"#;

pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn tickets_by_phone(&self, phone: &str) -> BotResult<Vec<TicketRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM tickets t
             JOIN events e ON e.id = t.event_id
             JOIN ticket_types tt ON tt.id = t.ticket_type_id
             JOIN organisers o ON o.id = e.organiser_id
             WHERE t.phone = $1 AND NOT t.deleted
             ORDER BY t.created_at"
        );
        let records = sqlx::query_as::<_, TicketRecord>(&sql)
            .bind(phone)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn find_by_qr(&self, qr_code: &str) -> BotResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT id, event_id, ticket_type_id, name_on_ticket, checked_in,
                    qr_code, price_paid, email, phone, deleted, payment_status,
                    created_at, updated_at
             FROM tickets
             WHERE qr_code = $1 AND NOT deleted",
        )
        .bind(qr_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn check_in(&self, qr_code: &str) -> BotResult<()> {
        sqlx::query(
            "UPDATE tickets
             SET checked_in = TRUE, updated_at = NOW()
             WHERE qr_code = $1 AND NOT deleted",
        )
        .bind(qr_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, ticket: NewTicket) -> BotResult<Option<Ticket>> {
        // Lock the type row before counting. Under READ COMMITTED a
        // single conditional INSERT is not enough: two buyers racing for
        // the last seat each count from a snapshot that excludes the
        // other's uncommitted row. Holding the row lock serialises them,
        // and the count taken after the lock sees every committed ticket.
        let mut tx = self.pool.begin().await?;

        let capacity: Option<i32> = sqlx::query_scalar(
            "SELECT available_quantity FROM ticket_types WHERE id = $1 FOR UPDATE",
        )
        .bind(ticket.ticket_type_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(capacity) = capacity else {
            tx.rollback().await?;
            return Ok(None);
        };

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE ticket_type_id = $1 AND NOT deleted",
        )
        .bind(ticket.ticket_type_id)
        .fetch_one(&mut *tx)
        .await?;
        if i64::from(capacity) <= taken {
            tx.rollback().await?;
            return Ok(None);
        }

        let created = sqlx::query_as::<_, Ticket>(
            "INSERT INTO tickets
                 (id, event_id, ticket_type_id, name_on_ticket, checked_in,
                  qr_code, price_paid, email, phone, deleted, payment_status)
             VALUES ($1, $2, $3, $4, FALSE, $5, $6, $7, $8, FALSE, $9)
             RETURNING id, event_id, ticket_type_id, name_on_ticket, checked_in,
                       qr_code, price_paid, email, phone, deleted, payment_status,
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(ticket.event_id)
        .bind(ticket.ticket_type_id)
        .bind(&ticket.name_on_ticket)
        .bind(Uuid::new_v4().to_string())
        .bind(ticket.price_paid)
        .bind(&ticket.email)
        .bind(&ticket.phone)
        .bind(&ticket.payment_status)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    async fn remaining_capacity(&self, ticket_type_id: Uuid) -> BotResult<i64> {
        let remaining: i64 = sqlx::query_scalar(
            "SELECT tt.available_quantity
                    - (SELECT COUNT(*) FROM tickets t
                       WHERE t.ticket_type_id = tt.id AND NOT t.deleted)
             FROM ticket_types tt
             WHERE tt.id = $1",
        )
        .bind(ticket_type_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(remaining)
    }

    async fn recompute_sold_out(&self, event_id: Uuid) -> BotResult<()> {
        sqlx::query(
            "UPDATE events e
             SET sold_out = NOT EXISTS (
                     SELECT 1 FROM ticket_types tt
                     WHERE tt.event_id = e.id AND NOT tt.deleted
                       AND tt.available_quantity >
                           (SELECT COUNT(*) FROM tickets t
                            WHERE t.ticket_type_id = tt.id AND NOT t.deleted)
                 ),
                 updated_at = NOW()
             WHERE e.id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
