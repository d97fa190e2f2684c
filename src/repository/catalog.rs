use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Category, Event, TicketType};
use crate::utils::error::BotResult;

/// Read-only access to the event/ticket-type/category catalog. Every
/// event query is scoped to rows buyers may see: active, not deleted,
/// not sold out.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search_events(&self, query: &str) -> BotResult<Vec<Event>>;

    async fn events_by_category(&self, category_id: Uuid) -> BotResult<Vec<Event>>;

    async fn categories(&self) -> BotResult<Vec<Category>>;

    async fn ticket_types(&self, event_id: Uuid) -> BotResult<Vec<TicketType>>;
}

const EVENT_COLUMNS: &str = r#"
    e.id, e.organiser_id, o.name AS organiser_name, e.title, e.description,
    e.start_time, e.end_time, e.latitude, e.longitude, e.address, e.location,
    e.image, e.is_active, e.sold_out, e.deleted, e.approve_tickets,
    e.ticket_delivery_method
"#;

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn search_events(&self, query: &str) -> BotResult<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS}
             FROM events e
             JOIN organisers o ON o.id = e.organiser_id
             WHERE e.is_active AND NOT e.deleted AND NOT e.sold_out
               AND (e.title ILIKE $1 OR e.description ILIKE $1)
             ORDER BY e.start_time"
        );
        let pattern = format!("%{}%", query.trim());
        let events = sqlx::query_as::<_, Event>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn events_by_category(&self, category_id: Uuid) -> BotResult<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS}
             FROM events e
             JOIN organisers o ON o.id = e.organiser_id
             JOIN selected_categories sc ON sc.event_id = e.id
             WHERE e.is_active AND NOT e.deleted AND NOT e.sold_out
               AND sc.category_id = $1
             ORDER BY e.start_time"
        );
        let events = sqlx::query_as::<_, Event>(&sql)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn categories(&self) -> BotResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, category_name, deleted
             FROM event_categories
             WHERE NOT deleted
             ORDER BY category_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn ticket_types(&self, event_id: Uuid) -> BotResult<Vec<TicketType>> {
        let ticket_types = sqlx::query_as::<_, TicketType>(
            "SELECT id, event_id, type_name, description, price, currency_code,
                    available_quantity, deleted
             FROM ticket_types
             WHERE event_id = $1 AND NOT deleted
             ORDER BY price",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ticket_types)
    }
}
