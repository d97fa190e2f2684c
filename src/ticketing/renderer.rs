use async_trait::async_trait;
use serde::Deserialize;

use crate::models::TicketRecord;
use crate::utils::error::{BotError, BotResult};

/// A rendered, uploaded ticket document ready to send.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedTicket {
    pub name: String,
    pub url: String,
}

/// PDF layout and object-storage upload live behind this seam; the
/// core only needs a document name and a durable URL back.
#[async_trait]
pub trait TicketRenderer: Send + Sync {
    async fn render(&self, ticket: &TicketRecord) -> BotResult<RenderedTicket>;
}

/// Production renderer: the rendering service takes the denormalized
/// ticket record and answers with the uploaded document's location.
pub struct HttpRenderer {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRenderer {
    pub fn new(http: reqwest::Client, endpoint: String) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl TicketRenderer for HttpRenderer {
    async fn render(&self, ticket: &TicketRecord) -> BotResult<RenderedTicket> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(ticket)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::Ticket(format!(
                "renderer responded with status {}",
                response.status()
            )));
        }

        let rendered = response.json::<RenderedTicket>().await?;
        Ok(rendered)
    }
}
