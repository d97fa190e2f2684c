//! The payment settlement protocol: one initiation per user action,
//! backoff polling to a terminal status, then ticket issuance. The
//! user sits in the quiescent `paynow` state for the whole run.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::machine::prompts;
use crate::session::{PaymentMethod, Session, SessionStore};
use crate::state::{ChatState, StateStore};
use crate::ticketing::Issuer;
use crate::utils::error::{BotError, BotResult};
use crate::whatsapp::Outbound;

use super::gateway::{InitiateRequest, PaymentGateway, PaymentStatus};

const INITIAL_DELAY: Duration = Duration::from_secs(5);
const BACKOFF_FACTOR: u32 = 2;

/// Where a settlement run ended up. `Pending` means the retry budget
/// ran out without a terminal status: the payment may still complete,
/// so it is never reported to the user as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Paid,
    Cancelled,
    Failed,
    Pending,
}

/// The delay before each poll attempt: 5s doubling, capped at 120s for
/// six attempts (600s and nine attempts for InnBucks, whose USSD
/// window is longer).
pub fn backoff_schedule(method: PaymentMethod) -> Vec<Duration> {
    let (max_attempts, max_delay) = match method {
        PaymentMethod::Innbucks => (9, Duration::from_secs(600)),
        _ => (6, Duration::from_secs(120)),
    };

    let mut delays = Vec::with_capacity(max_attempts);
    let mut delay = INITIAL_DELAY;
    for _ in 0..max_attempts {
        delays.push(delay);
        delay = (delay * BACKOFF_FACTOR).min(max_delay);
    }
    delays
}

pub struct Settlement {
    gateway: Arc<dyn PaymentGateway>,
    outbound: Arc<dyn Outbound>,
    sessions: Arc<dyn SessionStore>,
    states: Arc<dyn StateStore>,
    issuer: Arc<Issuer>,
}

impl Settlement {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        outbound: Arc<dyn Outbound>,
        sessions: Arc<dyn SessionStore>,
        states: Arc<dyn StateStore>,
        issuer: Arc<Issuer>,
    ) -> Self {
        Self {
            gateway,
            outbound,
            sessions,
            states,
            issuer,
        }
    }

    /// Initiate the payment and hand the poll loop to a background
    /// task. The webhook response must not wait minutes for the
    /// gateway; the `paynow` state set before spawning keeps the
    /// conversation closed to new purchases meanwhile.
    pub async fn process(self: &Arc<Self>, user_id: &str, session: &Session) -> BotResult<()> {
        let (request, method, phone) = match build_request(session) {
            Ok(parts) => parts,
            Err(error) => {
                tracing::warn!(user = %user_id, %error, "payment attempted with incomplete session");
                self.outbound
                    .send_text(
                        user_id,
                        "Your purchase details are incomplete. Please start over from the main menu.",
                    )
                    .await?;
                self.show_menu(user_id, session).await?;
                return Ok(());
            }
        };

        let outcome = match method {
            PaymentMethod::Web => self.gateway.initiate_web(&request).await?,
            mobile => self.gateway.initiate_mobile(&request, &phone, mobile).await?,
        };

        if !outcome.success {
            tracing::warn!(user = %user_id, error = ?outcome.error, "payment initiation rejected");
            self.outbound
                .send_text(user_id, "Error processing payment. Please try again😞")
                .await?;
            self.show_menu(user_id, session).await?;
            return Ok(());
        }

        match method {
            PaymentMethod::Innbucks => {
                if let Some(innbucks) = &outcome.innbucks {
                    self.innbucks_guidance(user_id, &innbucks.authorization_code, &innbucks.deep_link_url)
                        .await?;
                }
            }
            PaymentMethod::Web => {
                let redirect = outcome.redirect_url.clone().unwrap_or_default();
                self.outbound
                    .send_url_button(
                        user_id,
                        "Complete Payment",
                        "Tap the button below to see other payment options and complete payment.",
                        "Extra charges may apply.",
                        "See Payment Options",
                        &redirect,
                    )
                    .await?;
            }
            PaymentMethod::Ecocash => {
                self.outbound
                    .send_text(
                        user_id,
                        "📲 A payment request has been sent to your phone. Please check your handset and enter your EcoCash PIN to authorise it.",
                    )
                    .await?;
            }
        }

        let poll_url = outcome.poll_url.clone().ok_or_else(|| {
            BotError::Payment("gateway accepted payment but returned no poll url".into())
        })?;

        self.states.set(user_id, ChatState::Paynow).await?;

        let settlement = Arc::clone(self);
        let user = user_id.to_string();
        let session = session.clone();
        tokio::spawn(async move {
            settlement.finish(&user, &session, &poll_url, method).await;
        });

        Ok(())
    }

    /// Poll to a terminal status and settle the conversation. Runs off
    /// the request path; every outcome ends with the user holding a
    /// concrete next step.
    async fn finish(&self, user_id: &str, session: &Session, poll_url: &str, method: PaymentMethod) {
        let outcome = match self.poll_until_terminal(poll_url, method).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(user = %user_id, %error, "payment polling aborted");
                let _ = self
                    .outbound
                    .send_text(
                        user_id,
                        "There has been an error. If the payment was successful, please choose *My Tickets* at the main menu to view your ticket. If not, please try again.😞",
                    )
                    .await;
                let _ = self.states.set(user_id, ChatState::Menu).await;
                return;
            }
        };

        let result = match outcome {
            PollOutcome::Paid => self.settle_paid(user_id, session).await,
            PollOutcome::Cancelled => self.settle_with_menu(user_id, session, prompts::PAYMENT_CANCELLED).await,
            PollOutcome::Failed => self.settle_with_menu(user_id, session, prompts::PAYMENT_FAILED).await,
            PollOutcome::Pending => {
                let sent = self.outbound.send_text(user_id, prompts::PAYMENT_PENDING).await;
                let state = self.states.set(user_id, ChatState::Menu).await;
                sent.and(state)
            }
        };

        // Settlement must never leave the user parked in the quiescent
        // payment state; if even the outcome delivery failed, point them
        // at support and reopen the menu.
        if let Err(error) = result {
            tracing::error!(user = %user_id, %error, "failed to deliver settlement outcome");
            let _ = self
                .outbound
                .send_text(
                    user_id,
                    "There has been an error. If the payment was successful, please choose *My Tickets* at the main menu to view your ticket. If not, please contact support.😞",
                )
                .await;
            let _ = self.states.set(user_id, ChatState::Menu).await;
            let _ = self.show_menu(user_id, session).await;
        }
    }

    pub async fn poll_until_terminal(
        &self,
        poll_url: &str,
        method: PaymentMethod,
    ) -> BotResult<PollOutcome> {
        for delay in backoff_schedule(method) {
            tokio::time::sleep(delay).await;
            let status = self.gateway.poll(poll_url).await?;
            tracing::debug!(?status, "payment poll");
            match status {
                PaymentStatus::Paid => return Ok(PollOutcome::Paid),
                PaymentStatus::Cancelled => return Ok(PollOutcome::Cancelled),
                PaymentStatus::Failed => return Ok(PollOutcome::Failed),
                _ => {}
            }
        }
        Ok(PollOutcome::Pending)
    }

    async fn settle_paid(&self, user_id: &str, session: &Session) -> BotResult<()> {
        self.outbound
            .send_text(user_id, "Payment successful 🎉🎉🎉")
            .await?;
        self.outbound
            .send_text(user_id, "Please wait while we process your ticket⏳...")
            .await?;

        let summary = self.issuer.issue_paid(user_id, session).await?;
        if !summary.complete() {
            self.outbound
                .send_text(
                    user_id,
                    &format!(
                        "⚠️ {} of {} tickets were generated. Please contact support for the remainder.",
                        summary.issued, summary.requested
                    ),
                )
                .await?;
            return self.settle_with_menu(user_id, session, "").await;
        }

        self.states.set(user_id, ChatState::Menu).await
    }

    async fn settle_with_menu(&self, user_id: &str, session: &Session, message: &str) -> BotResult<()> {
        if !message.is_empty() {
            self.outbound.send_text(user_id, message).await?;
        }
        self.show_menu(user_id, session).await
    }

    async fn show_menu(&self, user_id: &str, session: &Session) -> BotResult<()> {
        self.outbound
            .send_buttons(
                user_id,
                &prompts::welcome(session.display_name()),
                &prompts::main_menu_buttons(),
            )
            .await?;
        self.states.set(user_id, ChatState::ChooseOption).await
    }

    async fn innbucks_guidance(&self, user_id: &str, auth_code: &str, deep_link: &str) -> BotResult<()> {
        self.outbound
            .send_text(
                user_id,
                "Use the order below to complete payment via USSD by dialing **569#*",
            )
            .await?;
        self.outbound
            .send_text(user_id, &format!("*{}*", space_auth_code(auth_code)))
            .await?;
        self.outbound.send_text(user_id, "*OR*").await?;
        self.outbound
            .send_url_button(
                user_id,
                "InnBucks Mobile",
                "Tap to open InnBucks mobile application to complete payment.",
                "Extra charges may apply.",
                "Open InnBucks",
                deep_link,
            )
            .await?;
        self.outbound
            .send_text(
                user_id,
                "*NOTE:* The transaction window will close in 10 minutes.",
            )
            .await
    }
}

fn build_request(session: &Session) -> BotResult<(InitiateRequest, PaymentMethod, String)> {
    let event = session
        .event
        .as_ref()
        .ok_or_else(|| BotError::Validation("no event on session".into()))?;
    let total = session
        .total
        .ok_or_else(|| BotError::Validation("no total on session".into()))?;
    session
        .quantity
        .ok_or_else(|| BotError::Validation("no quantity on session".into()))?;
    let method = session
        .payment_method
        .ok_or_else(|| BotError::Validation("no payment method on session".into()))?;
    let phone = session
        .phone_number
        .clone()
        .ok_or_else(|| BotError::Validation("no payment phone on session".into()))?;

    let request = InitiateRequest {
        reference: Uuid::new_v4().to_string(),
        payer_name: session.user_name.clone().unwrap_or_else(|| "Guest".into()),
        payer_email: "purchases@mukoto.app".into(),
        item: event.title.clone(),
        amount: total,
    };
    Ok((request, method, phone))
}

/// `123456789` reads better on a USSD keypad as `123 456 789`.
fn space_auth_code(code: &str) -> String {
    let digits: Vec<char> = code.chars().collect();
    digits
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let schedule = backoff_schedule(PaymentMethod::Ecocash);
        let secs: Vec<u64> = schedule.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![5, 10, 20, 40, 80, 120]);
    }

    #[test]
    fn innbucks_gets_the_longer_budget() {
        let schedule = backoff_schedule(PaymentMethod::Innbucks);
        let secs: Vec<u64> = schedule.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![5, 10, 20, 40, 80, 160, 320, 600, 600]);
    }

    #[test]
    fn auth_code_spacing() {
        assert_eq!(space_auth_code("123456789"), "123 456 789");
        assert_eq!(space_auth_code("1234"), "123 4");
        assert_eq!(space_auth_code(""), "");
    }
}
