//! Outbound message primitives over the WhatsApp Cloud API.
//!
//! The state machine only ever talks to the [`Outbound`] trait; the
//! [`CloudApi`] implementation is the one place that knows Graph API
//! payload shapes.

use async_trait::async_trait;
use serde_json::json;

use crate::utils::error::{BotError, BotResult};

/// Transport label limits. Truncation applies to display titles only,
/// never to ids.
pub const BUTTON_TITLE_LIMIT: usize = 20;
pub const ROW_TITLE_LIMIT: usize = 24;
pub const MAX_LIST_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleButton {
    pub id: String,
    pub title: String,
}

impl SimpleButton {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: String,
}

pub fn truncate_label(label: &str, limit: usize) -> String {
    label.chars().take(limit).collect()
}

#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> BotResult<()>;

    /// Up to three reply buttons.
    async fn send_buttons(&self, to: &str, body: &str, buttons: &[SimpleButton]) -> BotResult<()>;

    /// A radio-style list menu, at most [`MAX_LIST_ROWS`] rows.
    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        action_title: &str,
        rows: &[ListRow],
    ) -> BotResult<()>;

    async fn send_image(&self, to: &str, url: &str, caption: &str) -> BotResult<()>;

    async fn send_document(&self, to: &str, filename: &str, url: &str) -> BotResult<()>;

    async fn send_location(
        &self,
        to: &str,
        latitude: f64,
        longitude: f64,
        name: &str,
        address: &str,
    ) -> BotResult<()>;

    /// A call-to-action button opening an external URL.
    async fn send_url_button(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        button_text: &str,
        url: &str,
    ) -> BotResult<()>;
}

pub struct CloudApi {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
}

impl CloudApi {
    pub fn new(
        http: reqwest::Client,
        api_version: &str,
        phone_number_id: &str,
        access_token: String,
    ) -> Self {
        Self {
            http,
            messages_url: format!(
                "https://graph.facebook.com/{api_version}/{phone_number_id}/messages"
            ),
            access_token,
        }
    }

    async fn post(&self, payload: serde_json::Value) -> BotResult<()> {
        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "whatsapp send rejected");
            Err(BotError::external(
                "whatsapp",
                format!("send failed with status {status}"),
            ))
        }
    }

    fn base(&self, to: &str) -> serde_json::Value {
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
        })
    }
}

#[async_trait]
impl Outbound for CloudApi {
    async fn send_text(&self, to: &str, body: &str) -> BotResult<()> {
        let mut payload = self.base(to);
        payload["type"] = json!("text");
        payload["text"] = json!({ "body": body });
        self.post(payload).await
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[SimpleButton]) -> BotResult<()> {
        let buttons: Vec<_> = buttons
            .iter()
            .take(3)
            .map(|b| {
                json!({
                    "type": "reply",
                    "reply": {
                        "id": b.id,
                        "title": truncate_label(&b.title, BUTTON_TITLE_LIMIT),
                    }
                })
            })
            .collect();

        let mut payload = self.base(to);
        payload["type"] = json!("interactive");
        payload["interactive"] = json!({
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons },
        });
        self.post(payload).await
    }

    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        action_title: &str,
        rows: &[ListRow],
    ) -> BotResult<()> {
        let rows: Vec<_> = rows
            .iter()
            .take(MAX_LIST_ROWS)
            .map(|row| {
                json!({
                    "id": row.id,
                    "title": truncate_label(&row.title, ROW_TITLE_LIMIT),
                    "description": row.description,
                })
            })
            .collect();

        let mut payload = self.base(to);
        payload["type"] = json!("interactive");
        payload["interactive"] = json!({
            "type": "list",
            "header": { "type": "text", "text": header },
            "body": { "text": body },
            "footer": { "text": footer },
            "action": {
                "button": action_title,
                "sections": [{ "title": "Hi there!", "rows": rows }],
            },
        });
        self.post(payload).await
    }

    async fn send_image(&self, to: &str, url: &str, caption: &str) -> BotResult<()> {
        let mut payload = self.base(to);
        payload["type"] = json!("image");
        payload["image"] = json!({ "link": url, "caption": caption });
        self.post(payload).await
    }

    async fn send_document(&self, to: &str, filename: &str, url: &str) -> BotResult<()> {
        let mut payload = self.base(to);
        payload["type"] = json!("document");
        payload["document"] = json!({ "link": url, "filename": filename });
        self.post(payload).await
    }

    async fn send_location(
        &self,
        to: &str,
        latitude: f64,
        longitude: f64,
        name: &str,
        address: &str,
    ) -> BotResult<()> {
        let mut payload = self.base(to);
        payload["type"] = json!("location");
        payload["location"] = json!({
            "latitude": latitude,
            "longitude": longitude,
            "name": name,
            "address": address,
        });
        self.post(payload).await
    }

    async fn send_url_button(
        &self,
        to: &str,
        header: &str,
        body: &str,
        footer: &str,
        button_text: &str,
        url: &str,
    ) -> BotResult<()> {
        let mut payload = self.base(to);
        payload["type"] = json!("interactive");
        payload["interactive"] = json!({
            "type": "cta_url",
            "header": { "type": "text", "text": header },
            "body": { "text": body },
            "footer": { "text": footer },
            "action": {
                "name": "cta_url",
                "parameters": { "display_text": button_text, "url": url },
            },
        });
        self.post(payload).await
    }
}
