//! Turns an error plus the conversation context it occurred in into a
//! remediation menu instead of a dead end. Ordered pattern matching
//! over the context, first match wins; every internal failure degrades
//! to the ultimate fallback. This module never returns an error to its
//! caller.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::machine::prompts;
use crate::session::{Session, SessionPatch, SessionStore};
use crate::state::{ChatState, StateStore};
use crate::utils::error::{categorize, BotError, BotResult, ErrorCategory};
use crate::whatsapp::{Outbound, SimpleButton};

const MAX_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub state: ChatState,
    pub last_action: Option<String>,
    pub error_category: ErrorCategory,
    pub attempt_count: u32,
    pub last_successful_state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Payment,
    EventSearch,
    Ticket,
    Registration,
    ConfusedUser,
    ServiceOutage,
}

/// First matching strategy wins; `None` falls through to the graceful
/// fallback menu.
pub fn select_strategy(ctx: &RecoveryContext) -> Option<Strategy> {
    let state = ctx.state.as_str();
    let action = ctx.last_action.as_deref().unwrap_or("");

    if state.contains("payment") || state.contains("paynow") || action.contains("payment") {
        Some(Strategy::Payment)
    } else if state.contains("event") || state.contains("search") || action.contains("event") {
        Some(Strategy::EventSearch)
    } else if state.contains("ticket") || action.contains("ticket") {
        Some(Strategy::Ticket)
    } else if state.contains("registration") || action.contains("register") {
        Some(Strategy::Registration)
    } else if ctx.attempt_count > 2 {
        Some(Strategy::ConfusedUser)
    } else if ctx.error_category == ErrorCategory::ServiceUnavailable {
        Some(Strategy::ServiceOutage)
    } else {
        None
    }
}

struct Remediation {
    message: &'static str,
    buttons: Vec<SimpleButton>,
    next_state: ChatState,
}

fn remediation(strategy: Strategy) -> Remediation {
    match strategy {
        Strategy::Payment => Remediation {
            message: "💳 *Payment Issue Detected*\n\nIt looks like there was an issue with your payment. Let me help you complete your purchase.\n\nWould you like to:",
            buttons: vec![
                SimpleButton::new("_retry_payment", "🔄 Retry Payment"),
                SimpleButton::new("_change_payment_method", "💳 Change Method"),
                SimpleButton::new("_main_menu", "🏠 Start Over"),
            ],
            next_state: ChatState::PaymentRecovery,
        },
        Strategy::EventSearch => Remediation {
            message: "🔍 *Let's Find Your Event*\n\nI noticed you were looking for events. Let me help you find what you're looking for.\n\nWhat would you prefer to do?",
            buttons: vec![
                SimpleButton::new("_event_by_search", "🔎 Search Again"),
                SimpleButton::new("_event_by_category", "📂 Browse Categories"),
                SimpleButton::new("_main_menu", "🏠 Main Menu"),
            ],
            next_state: ChatState::EventRecovery,
        },
        Strategy::Ticket => Remediation {
            message: "🎫 *Ticket Issue*\n\nI see you were working with tickets. How can I help you?",
            buttons: vec![
                SimpleButton::new("_find_event", "🎟️ Buy Tickets"),
                SimpleButton::new("_view_resend_ticket", "📧 Resend Tickets"),
                SimpleButton::new("_main_menu", "🏠 Main Menu"),
            ],
            next_state: ChatState::TicketRecovery,
        },
        Strategy::Registration => Remediation {
            message: "📝 *Registration Help*\n\nI noticed you were registering for an event. Let me help you complete the process.",
            buttons: vec![
                SimpleButton::new("_confirm_registration", "✅ Try Again"),
                SimpleButton::new("_find_event", "🔄 Start Over"),
                SimpleButton::new("_main_menu", "🏠 Main Menu"),
            ],
            next_state: ChatState::RegistrationRecovery,
        },
        Strategy::ConfusedUser => Remediation {
            message: "🤔 *Let me help you*\n\nIt seems like you might be having trouble finding what you need. I'm here to help!\n\nWhat are you trying to do today?",
            buttons: vec![
                SimpleButton::new("_find_event", "🎪 Find Events"),
                SimpleButton::new("_view_resend_ticket", "🎫 Manage Tickets"),
                SimpleButton::new("_human_help", "🆘 Talk to Human"),
            ],
            next_state: ChatState::GeneralRecovery,
        },
        Strategy::ServiceOutage => Remediation {
            message: "⚠️ *Service Temporarily Unavailable*\n\nSome of our services are currently experiencing issues. Here's what you can do:",
            buttons: vec![
                SimpleButton::new("_retry_last_action", "🔄 Try Again"),
                SimpleButton::new("_main_menu", "🏠 Main Menu"),
            ],
            next_state: ChatState::ServiceRecovery,
        },
    }
}

pub struct RecoveryEngine {
    outbound: Arc<dyn Outbound>,
    sessions: Arc<dyn SessionStore>,
    states: Arc<dyn StateStore>,
    attempts: DashMap<String, u32>,
}

impl RecoveryEngine {
    pub fn new(
        outbound: Arc<dyn Outbound>,
        sessions: Arc<dyn SessionStore>,
        states: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            outbound,
            sessions,
            states,
            attempts: DashMap::new(),
        }
    }

    /// Always succeeds from the caller's perspective.
    pub async fn handle_error(
        &self,
        user_id: &str,
        error: &BotError,
        state: ChatState,
        session: &Session,
        last_action: Option<&str>,
    ) {
        tracing::warn!(
            user = %user_id,
            %error,
            state = %state,
            last_action = last_action.unwrap_or("-"),
            "initiating conversation recovery"
        );

        let attempt_count = {
            let mut entry = self.attempts.entry(user_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let ctx = RecoveryContext {
            state,
            last_action: last_action.map(str::to_string),
            error_category: categorize(error),
            attempt_count,
            last_successful_state: session.last_successful_state.clone(),
        };

        let result = self.run_strategy(user_id, &ctx, state).await;

        if let Err(recovery_error) = result {
            tracing::error!(
                user = %user_id,
                original = %error,
                %recovery_error,
                "recovery strategy failed"
            );
            self.ultimate_fallback(user_id).await;
        }

        if attempt_count >= MAX_RETRY_ATTEMPTS {
            self.attempts.remove(user_id);
        }
    }

    async fn run_strategy(
        &self,
        user_id: &str,
        ctx: &RecoveryContext,
        state: ChatState,
    ) -> BotResult<()> {
        match select_strategy(ctx) {
            Some(strategy) => {
                tracing::info!(user = %user_id, ?strategy, attempt = ctx.attempt_count, "executing recovery strategy");
                let plan = remediation(strategy);
                self.outbound
                    .send_buttons(user_id, plan.message, &plan.buttons)
                    .await?;
                self.states.set(user_id, plan.next_state).await?;

                // Remember where the user was so "go back" can work.
                if !matches!(state, ChatState::Menu | ChatState::ChooseOption) {
                    self.sessions
                        .merge(
                            user_id,
                            SessionPatch {
                                last_successful_state: Some(state.as_str().to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                Ok(())
            }
            None => self.graceful_fallback(user_id, ctx).await,
        }
    }

    async fn graceful_fallback(&self, user_id: &str, ctx: &RecoveryContext) -> BotResult<()> {
        if ctx.attempt_count > MAX_RETRY_ATTEMPTS {
            return self.offer_human_help(user_id).await;
        }

        let mut buttons = vec![
            SimpleButton::new("_retry_last_action", "🔄 Try Again"),
            SimpleButton::new("_main_menu", "🏠 Start Fresh"),
            SimpleButton::new("_human_help", "📞 Get Help"),
        ];
        if ctx.last_successful_state.is_some() {
            buttons.insert(0, SimpleButton::new("_return_to_last_state", "⏪ Go Back"));
        }

        self.outbound
            .send_buttons(
                user_id,
                "😅 *Oops! Something unexpected happened*\n\nDon't worry, I'm here to help you get back on track. What would you like to do?",
                &buttons,
            )
            .await?;
        self.states.set(user_id, ChatState::ErrorRecovery).await
    }

    async fn offer_human_help(&self, user_id: &str) -> BotResult<()> {
        let buttons = vec![
            SimpleButton::new("_human_help", "👤 Talk to Human"),
            SimpleButton::new("_main_menu", "🔄 Start Over"),
            SimpleButton::new("_send_feedback", "📧 Send Feedback"),
        ];
        self.outbound
            .send_buttons(
                user_id,
                "🆘 *Need Human Assistance?*\n\nI see you're having some trouble. Would you like me to connect you with a human helper, or shall we start fresh?",
                &buttons,
            )
            .await?;
        self.states.set(user_id, ChatState::HumanHelpOffer).await
    }

    /// Last line of defence: generic apology, state reset to menu,
    /// main menu re-shown after a short beat. Swallows its own errors.
    async fn ultimate_fallback(&self, user_id: &str) {
        let _ = self
            .outbound
            .send_text(
                user_id,
                "😔 I apologize for the technical difficulties. Let me reset everything and start fresh to help you better.",
            )
            .await;
        let _ = self.states.set(user_id, ChatState::Menu).await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        let welcome = prompts::welcome("there");
        if self
            .outbound
            .send_buttons(user_id, &welcome, &prompts::main_menu_buttons())
            .await
            .is_ok()
        {
            let _ = self.states.set(user_id, ChatState::ChooseOption).await;
        } else {
            tracing::error!(user = %user_id, "ultimate fallback failed to show main menu");
        }
    }

    /// Cleared whenever a user completes a transition normally.
    pub fn clear_attempts(&self, user_id: &str) {
        self.attempts.remove(user_id);
    }

    pub fn attempt_count(&self, user_id: &str) -> u32 {
        self.attempts.get(user_id).map(|v| *v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(state: ChatState) -> RecoveryContext {
        RecoveryContext {
            state,
            last_action: None,
            error_category: ErrorCategory::Unknown,
            attempt_count: 1,
            last_successful_state: None,
        }
    }

    #[test]
    fn payment_context_wins_over_everything() {
        let mut c = ctx(ChatState::ChoosePaymentMethod);
        c.attempt_count = 5;
        c.error_category = ErrorCategory::ServiceUnavailable;
        assert_eq!(select_strategy(&c), Some(Strategy::Payment));
        assert_eq!(
            select_strategy(&ctx(ChatState::Paynow)),
            Some(Strategy::Payment)
        );
    }

    #[test]
    fn event_and_ticket_contexts() {
        assert_eq!(
            select_strategy(&ctx(ChatState::SearchEvent)),
            Some(Strategy::EventSearch)
        );
        assert_eq!(
            select_strategy(&ctx(ChatState::ChooseTicketType)),
            Some(Strategy::Ticket)
        );
        assert_eq!(
            select_strategy(&ctx(ChatState::ResendTicket)),
            Some(Strategy::Ticket)
        );
    }

    #[test]
    fn repeated_failures_reach_confused_user() {
        let mut c = ctx(ChatState::Menu);
        c.attempt_count = 3;
        assert_eq!(select_strategy(&c), Some(Strategy::ConfusedUser));
    }

    #[test]
    fn service_outage_category() {
        let mut c = ctx(ChatState::Menu);
        c.error_category = ErrorCategory::ServiceUnavailable;
        assert_eq!(select_strategy(&c), Some(Strategy::ServiceOutage));
    }

    #[test]
    fn no_context_falls_through() {
        assert_eq!(select_strategy(&ctx(ChatState::Menu)), None);
    }

    #[test]
    fn last_action_keywords_apply() {
        let mut c = ctx(ChatState::Menu);
        c.last_action = Some("payment_initiation".into());
        assert_eq!(select_strategy(&c), Some(Strategy::Payment));
    }
}
