//! Durable key-value rows backing the session and state stores, keyed
//! by the user's phone number. Mutation is read-modify-write on a
//! per-user row; the per-user lock in the webhook handler serialises
//! writers for the same key.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::session::{Session, SessionPatch, SessionStore};
use crate::state::{ChatState, StateStore};
use crate::utils::error::BotResult;

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, user_id: &str) -> BotResult<Session> {
        let row: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT data FROM sessions WHERE phone = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(data) => {
                // A session written by an older build may not parse;
                // treat it as absent rather than wedging the user.
                Ok(serde_json::from_value(data).unwrap_or_default())
            }
            None => Ok(Session::default()),
        }
    }

    async fn merge(&self, user_id: &str, patch: SessionPatch) -> BotResult<()> {
        let mut session = self.get(user_id).await?;
        session.apply(patch);
        let data = serde_json::to_value(&session)
            .map_err(|e| crate::utils::error::BotError::Ticket(e.to_string()))?;

        sqlx::query(
            "INSERT INTO sessions (phone, data, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (phone)
             DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, user_id: &str) -> BotResult<()> {
        let data = serde_json::to_value(Session::default())
            .unwrap_or(serde_json::Value::Object(Default::default()));
        sqlx::query(
            "INSERT INTO sessions (phone, data, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (phone)
             DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, user_id: &str) -> BotResult<ChatState> {
        let label: Option<String> =
            sqlx::query_scalar("SELECT state FROM states WHERE phone = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(label
            .and_then(|l| l.parse().ok())
            .unwrap_or(ChatState::Menu))
    }

    async fn set(&self, user_id: &str, state: ChatState) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO states (phone, state, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (phone)
             DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
