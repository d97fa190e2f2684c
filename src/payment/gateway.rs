//! Paynow gateway client: payment initiation and status polling.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha512};

use crate::session::PaymentMethod;
use crate::utils::error::{BotError, BotResult};

/// Gateway-reported transaction status. The transaction is an external
/// oracle; nothing here is persisted locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Created,
    Sent,
    AwaitingDelivery,
    Paid,
    Cancelled,
    Failed,
    /// Anything the gateway says that we do not recognise. Treated as
    /// non-terminal: keep polling rather than guessing an outcome.
    Unknown,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "created" => PaymentStatus::Created,
            "sent" => PaymentStatus::Sent,
            "awaiting delivery" => PaymentStatus::AwaitingDelivery,
            "paid" => PaymentStatus::Paid,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            "failed" | "error" => PaymentStatus::Failed,
            _ => PaymentStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Cancelled | PaymentStatus::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub reference: String,
    pub payer_name: String,
    pub payer_email: String,
    pub item: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct InnbucksInfo {
    pub authorization_code: String,
    pub deep_link_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct InitiateOutcome {
    pub success: bool,
    pub poll_url: Option<String>,
    pub redirect_url: Option<String>,
    pub innbucks: Option<InnbucksInfo>,
    pub error: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Push a payment request to the payer's mobile wallet.
    async fn initiate_mobile(
        &self,
        request: &InitiateRequest,
        phone: &str,
        method: PaymentMethod,
    ) -> BotResult<InitiateOutcome>;

    /// Start a hosted web payment; the outcome carries a redirect URL.
    async fn initiate_web(&self, request: &InitiateRequest) -> BotResult<InitiateOutcome>;

    async fn poll(&self, poll_url: &str) -> BotResult<PaymentStatus>;
}

const INITIATE_URL: &str = "https://www.paynow.co.zw/interface/initiatetransaction";
const REMOTE_URL: &str = "https://www.paynow.co.zw/interface/remotetransaction";

pub struct PaynowGateway {
    http: reqwest::Client,
    integration_id: String,
    integration_key: String,
    result_url: String,
    return_url: String,
}

impl PaynowGateway {
    pub fn new(
        http: reqwest::Client,
        integration_id: String,
        integration_key: String,
        result_url: String,
        return_url: String,
    ) -> Self {
        Self {
            http,
            integration_id,
            integration_key,
            result_url,
            return_url,
        }
    }

    /// SHA512 over the concatenated field values (posting order) plus
    /// the integration key, upper-cased hex.
    fn hash(&self, fields: &[(&str, String)]) -> String {
        let mut hasher = Sha512::new();
        for (_, value) in fields {
            hasher.update(value.as_bytes());
        }
        hasher.update(self.integration_key.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02X}"));
        }
        out
    }

    fn base_fields(&self, request: &InitiateRequest) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.integration_id.clone()),
            ("reference", request.reference.clone()),
            ("amount", request.amount.to_string()),
            ("additionalinfo", request.item.clone()),
            ("returnurl", self.return_url.clone()),
            ("resulturl", self.result_url.clone()),
            ("authemail", request.payer_email.clone()),
            ("status", "Message".to_string()),
        ]
    }

    async fn post(&self, url: &str, mut fields: Vec<(&'static str, String)>) -> BotResult<String> {
        let hash = self.hash(&fields);
        fields.push(("hash", hash));

        let response = self.http.post(url).form(&fields).send().await?;
        if !response.status().is_success() {
            return Err(BotError::Payment(format!(
                "paynow responded with status {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    fn parse_initiate(body: &str) -> InitiateOutcome {
        let pairs = parse_urlencoded(body);
        let get = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());

        let status = get("status").unwrap_or_default();
        if !status.eq_ignore_ascii_case("ok") {
            return InitiateOutcome {
                success: false,
                error: get("error"),
                ..Default::default()
            };
        }

        let innbucks = match (get("authorizationcode"), get("authorizationurl")) {
            (Some(code), Some(link)) => Some(InnbucksInfo {
                authorization_code: code,
                deep_link_url: link,
            }),
            _ => None,
        };

        InitiateOutcome {
            success: true,
            poll_url: get("pollurl"),
            redirect_url: get("browserurl"),
            innbucks,
            error: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for PaynowGateway {
    async fn initiate_mobile(
        &self,
        request: &InitiateRequest,
        phone: &str,
        method: PaymentMethod,
    ) -> BotResult<InitiateOutcome> {
        let mut fields = self.base_fields(request);
        fields.push(("phone", phone.to_string()));
        fields.push(("method", method.as_str().to_string()));

        let body = self.post(REMOTE_URL, fields).await?;
        Ok(Self::parse_initiate(&body))
    }

    async fn initiate_web(&self, request: &InitiateRequest) -> BotResult<InitiateOutcome> {
        let body = self.post(INITIATE_URL, self.base_fields(request)).await?;
        Ok(Self::parse_initiate(&body))
    }

    async fn poll(&self, poll_url: &str) -> BotResult<PaymentStatus> {
        let response = self.http.get(poll_url).send().await?;
        if !response.status().is_success() {
            return Err(BotError::Payment(format!(
                "poll responded with status {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        let pairs = parse_urlencoded(&body);
        let status = pairs
            .iter()
            .find(|(k, _)| k == "status")
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        Ok(PaymentStatus::parse(status))
    }
}

fn parse_urlencoded(body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect()
}
