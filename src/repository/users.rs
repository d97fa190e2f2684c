use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::User;
use crate::utils::error::BotResult;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup is by local trunk form (`0…`); callers normalise first.
    async fn by_phone(&self, phone: &str) -> BotResult<Option<User>>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn by_phone(&self, phone: &str) -> BotResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, organiser_id, name, email, phone_number,
                    can_approve_tickets, deleted
             FROM users
             WHERE phone_number = $1 AND NOT deleted",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
