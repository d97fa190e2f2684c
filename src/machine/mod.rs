//! The conversation state machine: maps (current state, inbound
//! message) to outbound prompts and exactly one next state. Dispatch is
//! an exhaustive match over [`ChatState`], so the compiler guarantees
//! every state handles every input shape, and every handler path ends
//! by writing a state.

pub mod prompts;

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::payment::Settlement;
use crate::recovery::RecoveryEngine;
use crate::repository::{Catalog, TicketStore};
use crate::session::{PaymentMethod, Session, SessionPatch, SessionStore};
use crate::state::{ChatState, StateStore};
use crate::ticketing::{CheckInOutcome, Issuer, RegistrationOutcome};
use crate::utils::error::BotResult;
use crate::utils::validation::{
    is_qr_token, parse_quantity, sanitize_input, validate_payment_phone, normalize_phone,
    QuantityError,
};
use crate::whatsapp::{InboundKind, InboundMessage, Outbound};

pub struct Bot {
    outbound: Arc<dyn Outbound>,
    catalog: Arc<dyn Catalog>,
    tickets: Arc<dyn TicketStore>,
    sessions: Arc<dyn SessionStore>,
    states: Arc<dyn StateStore>,
    settlement: Arc<Settlement>,
    issuer: Arc<Issuer>,
    recovery: RecoveryEngine,
    // Serialises handling per user so webhook redelivery or
    // out-of-order delivery cannot interleave one conversation.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Bot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outbound: Arc<dyn Outbound>,
        catalog: Arc<dyn Catalog>,
        tickets: Arc<dyn TicketStore>,
        sessions: Arc<dyn SessionStore>,
        states: Arc<dyn StateStore>,
        settlement: Arc<Settlement>,
        issuer: Arc<Issuer>,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            outbound,
            catalog,
            tickets,
            sessions,
            states,
            settlement,
            issuer,
            recovery,
            locks: DashMap::new(),
        }
    }

    /// Top-level entry for one inbound message. Business failures are
    /// reported to the user in-flow; unexpected errors are delegated
    /// to the recovery engine. Nothing escapes to the transport.
    pub async fn handle(&self, message: InboundMessage) {
        let user_id = message.from_phone.clone();
        let user_name = sanitize_input(&message.from_name);
        let user_name = if user_name.is_empty() {
            "User".to_string()
        } else {
            user_name
        };

        let lock = self
            .locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        tracing::info!(user = %user_id, kind = ?message.kind, "processing message");

        if let Err(error) = self
            .sessions
            .merge(&user_id, SessionPatch::user_name(user_name.clone()))
            .await
        {
            tracing::error!(user = %user_id, %error, "failed to record user name");
        }

        // Global interrupt: a v4 UUID in free text is a check-in scan,
        // whatever state the conversation is in.
        if let InboundKind::Text(text) = &message.kind {
            if is_qr_token(text) {
                self.handle_checkin_scan(&user_id, text.trim()).await;
                return;
            }
        }

        let state = match self.states.get(&user_id).await {
            Ok(state) => state,
            Err(error) => {
                tracing::error!(user = %user_id, %error, "state lookup failed");
                ChatState::Menu
            }
        };
        let session = match self.sessions.get(&user_id).await {
            Ok(session) => session,
            Err(error) => {
                tracing::error!(user = %user_id, %error, "session lookup failed");
                Session::default()
            }
        };

        match self
            .dispatch(&user_id, &user_name, state, &session, &message.kind)
            .await
        {
            Ok(()) => self.recovery.clear_attempts(&user_id),
            Err(error) => {
                self.recovery
                    .handle_error(&user_id, &error, state, &session, None)
                    .await;
            }
        }
    }

    async fn dispatch(
        &self,
        user_id: &str,
        user_name: &str,
        state: ChatState,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        match state {
            ChatState::Menu => self.show_main_menu(user_id, user_name).await,

            ChatState::ChooseOption => self.choose_option(user_id, user_name, kind).await,

            ChatState::FindEvent => self.find_event(user_id, user_name, kind).await,

            ChatState::SearchEvent => self.search_event(user_id, kind).await,

            ChatState::FindEventByCategory => self.find_event_by_category(user_id, kind).await,

            ChatState::ShowEvent => self.show_event(user_id, user_name, session, kind).await,

            ChatState::ChoosenEventOptions => {
                self.choosen_event_options(user_id, user_name, session, kind).await
            }

            ChatState::ChooseTicketType => {
                self.choose_ticket_type(user_id, user_name, session, kind).await
            }

            ChatState::ConfirmFreeRegistration => {
                self.confirm_free_registration(user_id, user_name, session, kind).await
            }

            ChatState::EnterTicketQuantity => {
                self.enter_ticket_quantity(user_id, user_name, session, kind).await
            }

            ChatState::ChoosePaymentMethod => {
                self.choose_payment_method(user_id, session, kind).await
            }

            ChatState::ChoosePhoneNumber => self.choose_phone_number(user_id, session, kind).await,

            ChatState::OtherPhoneNumber => self.other_phone_number(user_id, session, kind).await,

            ChatState::EventFallback => self.event_fallback(user_id, user_name, kind).await,

            ChatState::Utilities => self.utilities(user_id, user_name, kind).await,

            ChatState::SendEventLocation => {
                self.send_event_location(user_id, user_name, session, kind).await
            }

            ChatState::ResendTicket => self.resend_ticket(user_id, user_name, session, kind).await,

            // Payment in flight: the settlement task owns the
            // conversation, further input is deliberately ignored.
            ChatState::Paynow => Ok(()),

            ChatState::CollectingFeedback => self.collect_feedback(user_id, user_name, kind).await,

            ChatState::PaymentRecovery
            | ChatState::EventRecovery
            | ChatState::TicketRecovery
            | ChatState::RegistrationRecovery
            | ChatState::GeneralRecovery
            | ChatState::ServiceRecovery
            | ChatState::ErrorRecovery
            | ChatState::HumanHelpOffer => {
                self.recovery_action(user_id, user_name, session, kind).await
            }

            ChatState::AwaitingHumanSupport => self.show_main_menu(user_id, user_name).await,
        }
    }

    async fn show_main_menu(&self, user_id: &str, user_name: &str) -> BotResult<()> {
        self.outbound
            .send_buttons(
                user_id,
                &prompts::welcome(user_name),
                &prompts::main_menu_buttons(),
            )
            .await?;
        self.states.set(user_id, ChatState::ChooseOption).await
    }

    async fn invalid_option(&self, user_id: &str, user_name: &str, text: &str) -> BotResult<()> {
        self.outbound.send_text(user_id, text).await?;
        self.show_main_menu(user_id, user_name).await
    }

    async fn choose_option(
        &self,
        user_id: &str,
        user_name: &str,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await;
        };

        match id.as_str() {
            "_find_event" => self.prompt_find_event(user_id).await,
            "_view_resend_ticket" => self.list_user_tickets(
                user_id,
                user_name,
                "Select an event to get your ticket.",
                ChatState::ResendTicket,
            )
            .await,
            "_utilities" => {
                self.outbound
                    .send_buttons(user_id, "Choose a utility option:", &prompts::utility_buttons())
                    .await?;
                self.states.set(user_id, ChatState::Utilities).await
            }
            _ => self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await,
        }
    }

    async fn prompt_find_event(&self, user_id: &str) -> BotResult<()> {
        self.outbound
            .send_buttons(
                user_id,
                "Choose how you would like to find an event:",
                &prompts::find_event_buttons(),
            )
            .await?;
        self.states.set(user_id, ChatState::FindEvent).await
    }

    /// Shared by My Tickets and the Event Location utility: tickets
    /// for this phone, collapsed to one row per event.
    async fn list_user_tickets(
        &self,
        user_id: &str,
        user_name: &str,
        body: &str,
        next: ChatState,
    ) -> BotResult<()> {
        let tickets = self.tickets.tickets_by_phone(user_id).await?;
        if tickets.is_empty() {
            let message = if next == ChatState::SendEventLocation {
                "You have no tickets to view event locations."
            } else {
                "Ticket(s) not found. Please try again."
            };
            return self.invalid_option(user_id, user_name, message).await;
        }

        let rows = prompts::dedup_ticket_events(&tickets);
        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    tickets: Some(tickets),
                    ..Default::default()
                },
            )
            .await?;
        self.outbound
            .send_list(
                user_id,
                prompts::LIST_HEADER,
                body,
                prompts::LIST_FOOTER,
                "Select Event",
                &rows,
            )
            .await?;
        self.states.set(user_id, next).await
    }

    async fn find_event(
        &self,
        user_id: &str,
        user_name: &str,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await;
        };

        match id.as_str() {
            "_event_by_search" => self.prompt_search(user_id).await,
            "_event_by_category" => self.prompt_categories(user_id, user_name).await,
            _ => self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await,
        }
    }

    async fn prompt_search(&self, user_id: &str) -> BotResult<()> {
        self.outbound.send_text(user_id, prompts::SEARCH_PROMPT).await?;
        self.states.set(user_id, ChatState::SearchEvent).await
    }

    async fn prompt_categories(&self, user_id: &str, user_name: &str) -> BotResult<()> {
        let categories = self.catalog.categories().await?;
        if categories.is_empty() {
            return self
                .invalid_option(user_id, user_name, "No event categories found. Please try again later.")
                .await;
        }
        self.outbound
            .send_list(
                user_id,
                prompts::LIST_HEADER,
                "Select a category to view events.",
                prompts::LIST_FOOTER,
                "Select Category",
                &prompts::category_rows(&categories),
            )
            .await?;
        self.states.set(user_id, ChatState::FindEventByCategory).await
    }

    async fn search_event(&self, user_id: &str, kind: &InboundKind) -> BotResult<()> {
        let InboundKind::Text(query) = kind else {
            // Wrong input shape: re-prompt without advancing.
            self.outbound.send_text(user_id, prompts::SEARCH_PROMPT).await?;
            return self.states.set(user_id, ChatState::SearchEvent).await;
        };

        let events = self.catalog.search_events(&sanitize_input(query)).await?;
        self.present_events(user_id, events, prompts::NO_EVENTS_FOUND).await
    }

    async fn find_event_by_category(&self, user_id: &str, kind: &InboundKind) -> BotResult<()> {
        let InboundKind::ListReply { id } = kind else {
            self.outbound
                .send_text(user_id, "Please select a category from the list.")
                .await?;
            return self.states.set(user_id, ChatState::FindEventByCategory).await;
        };

        let Ok(category_id) = Uuid::parse_str(id) else {
            self.outbound
                .send_text(user_id, "Please select a category from the list.")
                .await?;
            return self.states.set(user_id, ChatState::FindEventByCategory).await;
        };

        let events = self.catalog.events_by_category(category_id).await?;
        self.present_events(user_id, events, prompts::NO_CATEGORY_EVENTS).await
    }

    async fn present_events(
        &self,
        user_id: &str,
        events: Vec<crate::models::Event>,
        empty_message: &str,
    ) -> BotResult<()> {
        if events.is_empty() {
            self.outbound
                .send_buttons(user_id, empty_message, &prompts::event_fallback_buttons())
                .await?;
            return self.states.set(user_id, ChatState::EventFallback).await;
        }

        self.outbound
            .send_list(
                user_id,
                prompts::LIST_HEADER,
                "Here are the events we found.",
                prompts::LIST_FOOTER,
                "Select Event",
                &prompts::event_rows(&events),
            )
            .await?;
        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    events: Some(events),
                    ..Default::default()
                },
            )
            .await?;
        self.states.set(user_id, ChatState::ShowEvent).await
    }

    async fn show_event(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ListReply { id } = kind else {
            return self
                .invalid_option(user_id, user_name, "Select an event from the list. Please try again.")
                .await;
        };

        let event = Uuid::parse_str(id).ok().and_then(|event_id| {
            session
                .events
                .as_ref()
                .and_then(|events| events.iter().find(|e| e.id == event_id).cloned())
        });

        let Some(event) = event else {
            return self
                .invalid_option(user_id, user_name, "Event not found. Please try again.")
                .await;
        };

        if let Some(image) = &event.image {
            self.outbound
                .send_image(user_id, image, &prompts::event_caption(&event))
                .await?;
        } else {
            self.outbound
                .send_text(user_id, &prompts::event_caption(&event))
                .await?;
        }
        self.outbound
            .send_buttons(
                user_id,
                "🎫 *Event Details*\n\nWhat would you like to do next?",
                &prompts::purchase_buttons(),
            )
            .await?;
        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    event: Some(event),
                    ..Default::default()
                },
            )
            .await?;
        self.states.set(user_id, ChatState::ChoosenEventOptions).await
    }

    async fn choosen_event_options(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self
                .invalid_option(user_id, user_name, "Choose a valid option. Please try again.")
                .await;
        };

        match (id.as_str(), &session.event) {
            ("_purchase", Some(event)) => {
                let ticket_types = self.catalog.ticket_types(event.id).await?;
                if ticket_types.is_empty() {
                    return self
                        .invalid_option(
                            user_id,
                            user_name,
                            "There are no tickets for this event. Please try again later.",
                        )
                        .await;
                }
                self.outbound
                    .send_list(
                        user_id,
                        prompts::LIST_HEADER,
                        "Select a ticket type.",
                        prompts::LIST_FOOTER,
                        "Select Ticket Type",
                        &prompts::ticket_type_rows(&ticket_types),
                    )
                    .await?;
                self.sessions
                    .merge(
                        user_id,
                        SessionPatch {
                            ticket_types: Some(ticket_types),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.states.set(user_id, ChatState::ChooseTicketType).await
            }
            ("_find_event", _) => self.prompt_find_event(user_id).await,
            _ => self.show_main_menu(user_id, user_name).await,
        }
    }

    async fn choose_ticket_type(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ListReply { id } = kind else {
            return self
                .invalid_option(user_id, user_name, "Please select a ticket type. Please try again.")
                .await;
        };

        let ticket_type = Uuid::parse_str(id).ok().and_then(|tt_id| {
            session
                .ticket_types
                .as_ref()
                .and_then(|tts| tts.iter().find(|tt| tt.id == tt_id).cloned())
        });

        let Some(ticket_type) = ticket_type else {
            return self
                .invalid_option(user_id, user_name, "Please select a ticket type. Please try again.")
                .await;
        };

        // Free and paid ticket types take different roads from here.
        let next = if ticket_type.is_free() {
            self.outbound
                .send_buttons(
                    user_id,
                    &prompts::free_registration_confirmation(&ticket_type),
                    &prompts::free_registration_buttons(),
                )
                .await?;
            ChatState::ConfirmFreeRegistration
        } else {
            self.outbound
                .send_text(
                    user_id,
                    &format!(
                        "You have selected {}. How many tickets do you want to buy? (Maximum: 10)",
                        ticket_type.type_name
                    ),
                )
                .await?;
            ChatState::EnterTicketQuantity
        };

        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    ticket_type: Some(ticket_type),
                    ..Default::default()
                },
            )
            .await?;
        self.states.set(user_id, next).await
    }

    async fn confirm_free_registration(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await;
        };

        if id != "_confirm_registration" {
            return self.show_main_menu(user_id, user_name).await;
        }

        self.run_free_registration(user_id, user_name, session).await
    }

    async fn run_free_registration(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
    ) -> BotResult<()> {
        if session.ticket_type.is_none() || session.event.is_none() {
            return self
                .invalid_option(
                    user_id,
                    user_name,
                    "❌ *Registration Failed*\n\nMissing required information. Please start over and try again.",
                )
                .await;
        }

        self.outbound
            .send_text(
                user_id,
                "⏳ *Processing Registration*\n\nPlease wait while we register you for this event...",
            )
            .await?;

        let event_title = session.event.as_ref().map(|e| e.title.clone()).unwrap_or_default();
        match self.issuer.register_free(user_id, session).await? {
            RegistrationOutcome::SoldOut => {
                self.invalid_option(
                    user_id,
                    user_name,
                    "❌ *Registration Failed*\n\nThis event is sold out.\n\nPlease try another event.",
                )
                .await
            }
            RegistrationOutcome::Registered { delivered: true } => {
                self.outbound
                    .send_text(user_id, &prompts::registration_success(&event_title))
                    .await?;
                self.show_main_menu(user_id, user_name).await
            }
            RegistrationOutcome::Registered { delivered: false } => {
                self.invalid_option(
                    user_id,
                    user_name,
                    "✅ *Registration Successful*\n\n❌ However, ticket generation failed. Your registration is confirmed; please contact support for your ticket document.",
                )
                .await
            }
        }
    }

    async fn enter_ticket_quantity(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let text = match kind {
            InboundKind::Text(text) => text.as_str(),
            _ => "",
        };

        let quantity = match parse_quantity(text) {
            Ok(quantity) => quantity,
            Err(reason) => {
                self.outbound
                    .send_text(
                        user_id,
                        prompts::invalid_quantity(reason == QuantityError::OverLimit),
                    )
                    .await?;
                return self.states.set(user_id, ChatState::EnterTicketQuantity).await;
            }
        };

        let Some(ticket_type) = session.ticket_type.clone() else {
            return self.show_main_menu(user_id, user_name).await;
        };

        let total = Decimal::from(quantity) * ticket_type.price;
        self.outbound
            .send_buttons(
                user_id,
                &prompts::purchase_summary(quantity, &ticket_type, total),
                &prompts::payment_method_buttons(),
            )
            .await?;
        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    quantity: Some(quantity),
                    total: Some(total),
                    ..Default::default()
                },
            )
            .await?;
        self.states.set(user_id, ChatState::ChoosePaymentMethod).await
    }

    async fn choose_payment_method(
        &self,
        user_id: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let method = match kind {
            InboundKind::ButtonReply { id } => PaymentMethod::from_button_id(id),
            _ => None,
        };

        let Some(method) = method else {
            self.outbound
                .send_buttons(
                    user_id,
                    "Please select a payment method:",
                    &prompts::payment_method_buttons(),
                )
                .await?;
            return self.states.set(user_id, ChatState::ChoosePaymentMethod).await;
        };

        if method == PaymentMethod::Web {
            let phone = normalize_phone(user_id);
            let patch = SessionPatch {
                payment_method: Some(method),
                phone_number: Some(phone),
                ..Default::default()
            };
            return self.start_payment(user_id, session, patch).await;
        }

        self.sessions
            .merge(
                user_id,
                SessionPatch {
                    payment_method: Some(method),
                    ..Default::default()
                },
            )
            .await?;
        self.outbound
            .send_buttons(
                user_id,
                "Choose a payment number:",
                &prompts::payment_number_buttons(),
            )
            .await?;
        self.states.set(user_id, ChatState::ChoosePhoneNumber).await
    }

    async fn choose_phone_number(
        &self,
        user_id: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let button = match kind {
            InboundKind::ButtonReply { id } => id.as_str(),
            _ => "",
        };

        match button {
            "_use_this_number" => {
                let patch = SessionPatch::phone_number(normalize_phone(user_id));
                self.start_payment(user_id, session, patch).await
            }
            "_other_payment_number" => {
                self.outbound
                    .send_text(
                        user_id,
                        "Please enter the desired transact number: for example *0771111111*",
                    )
                    .await?;
                self.states.set(user_id, ChatState::OtherPhoneNumber).await
            }
            _ => {
                self.outbound
                    .send_buttons(
                        user_id,
                        "Choose a payment number:",
                        &prompts::payment_number_buttons(),
                    )
                    .await?;
                self.states.set(user_id, ChatState::ChoosePhoneNumber).await
            }
        }
    }

    async fn other_phone_number(
        &self,
        user_id: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::Text(text) = kind else {
            self.outbound
                .send_text(
                    user_id,
                    "Please enter the desired transact number: for example *0771111111*",
                )
                .await?;
            return self.states.set(user_id, ChatState::OtherPhoneNumber).await;
        };

        match validate_payment_phone(text) {
            Ok(phone) => {
                self.start_payment(user_id, session, SessionPatch::phone_number(phone)).await
            }
            Err(_) => {
                self.outbound
                    .send_text(
                        user_id,
                        "❌ That doesn't look like a valid number. Please enter it like *0771111111*.",
                    )
                    .await?;
                self.states.set(user_id, ChatState::OtherPhoneNumber).await
            }
        }
    }

    /// Persist the final purchase details and hand over to the
    /// settlement protocol, which owns the conversation from here.
    async fn start_payment(
        &self,
        user_id: &str,
        session: &Session,
        patch: SessionPatch,
    ) -> BotResult<()> {
        self.sessions.merge(user_id, patch.clone()).await?;
        let mut session = session.clone();
        session.apply(patch);
        self.settlement.process(user_id, &session).await
    }

    async fn event_fallback(
        &self,
        user_id: &str,
        user_name: &str,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self.invalid_option(user_id, user_name, prompts::CHOOSE_FROM_MENU).await;
        };

        if id == "_find_event" {
            self.prompt_search(user_id).await
        } else {
            self.show_main_menu(user_id, user_name).await
        }
    }

    async fn utilities(&self, user_id: &str, user_name: &str, kind: &InboundKind) -> BotResult<()> {
        if !matches!(kind, InboundKind::ButtonReply { .. }) {
            return self
                .invalid_option(user_id, user_name, "Select a valid option. Please try again.")
                .await;
        }
        self.list_user_tickets(
            user_id,
            user_name,
            "Select an event to view its location.",
            ChatState::SendEventLocation,
        )
        .await
    }

    async fn send_event_location(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        if let InboundKind::ListReply { id } = kind {
            let ticket = Uuid::parse_str(id).ok().and_then(|event_id| {
                session
                    .tickets
                    .as_ref()
                    .and_then(|tickets| tickets.iter().find(|t| t.event_id == event_id).cloned())
            });

            let location = ticket.and_then(|t| {
                let latitude: f64 = t.latitude.as_deref()?.parse().ok()?;
                let longitude: f64 = t.longitude.as_deref()?.parse().ok()?;
                Some((latitude, longitude, t.location?, t.address?))
            });

            match location {
                Some((latitude, longitude, name, address)) => {
                    self.outbound
                        .send_location(user_id, latitude, longitude, &name, &address)
                        .await?;
                }
                None => {
                    self.outbound
                        .send_text(user_id, "Event not found. Please try again.")
                        .await?;
                }
            }
        }
        self.show_main_menu(user_id, user_name).await
    }

    async fn resend_ticket(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        if let InboundKind::ListReply { id } = kind {
            let selected: Vec<_> = Uuid::parse_str(id)
                .ok()
                .and_then(|event_id| {
                    session.tickets.as_ref().map(|tickets| {
                        tickets
                            .iter()
                            .filter(|t| t.event_id == event_id)
                            .cloned()
                            .collect()
                    })
                })
                .unwrap_or_default();

            if selected.is_empty() {
                self.outbound
                    .send_text(user_id, "Tickets not found. Please try again.")
                    .await?;
            } else {
                for ticket in &selected {
                    self.issuer.resend(user_id, ticket).await?;
                }
            }
        } else {
            self.outbound
                .send_text(user_id, "You have not selected any event. Please try again.")
                .await?;
        }
        self.show_main_menu(user_id, user_name).await
    }

    async fn collect_feedback(
        &self,
        user_id: &str,
        user_name: &str,
        kind: &InboundKind,
    ) -> BotResult<()> {
        if let InboundKind::Text(text) = kind {
            tracing::info!(user = %user_id, feedback = %sanitize_input(text), "user feedback received");
            self.outbound
                .send_text(
                    user_id,
                    "🙏 Thank you for your feedback! Our team will review it shortly.",
                )
                .await?;
        }
        self.show_main_menu(user_id, user_name).await
    }

    /// Buttons offered by the recovery engine's remediation menus.
    async fn recovery_action(
        &self,
        user_id: &str,
        user_name: &str,
        session: &Session,
        kind: &InboundKind,
    ) -> BotResult<()> {
        let InboundKind::ButtonReply { id } = kind else {
            return self.show_main_menu(user_id, user_name).await;
        };

        match id.as_str() {
            "_retry_payment" | "_change_payment_method" => {
                if session.total.is_some() {
                    self.outbound
                        .send_buttons(
                            user_id,
                            "💳 Let's try your payment again. Choose a payment method:",
                            &prompts::payment_method_buttons(),
                        )
                        .await?;
                    self.states.set(user_id, ChatState::ChoosePaymentMethod).await
                } else {
                    self.show_main_menu(user_id, user_name).await
                }
            }
            "_retry_last_action" | "_return_to_last_state" => {
                match session
                    .last_successful_state
                    .as_deref()
                    .and_then(|label| label.parse::<ChatState>().ok())
                {
                    Some(state) => {
                        self.outbound
                            .send_text(user_id, "⏪ Taking you back to where you were...")
                            .await?;
                        self.states.set(user_id, state).await
                    }
                    None => self.show_main_menu(user_id, user_name).await,
                }
            }
            "_human_help" => {
                self.outbound
                    .send_text(
                        user_id,
                        "👤 *Connecting you with human support*\n\n📧 Support Contact: support@mukoto.app\n\nOur team will get back to you within 24 hours. In the meantime, you can continue using the bot.",
                    )
                    .await?;
                self.states.set(user_id, ChatState::AwaitingHumanSupport).await
            }
            "_send_feedback" => {
                self.outbound
                    .send_text(
                        user_id,
                        "📧 *Share Your Feedback*\n\nPlease describe what went wrong or what you'd like us to improve. Just type your message.",
                    )
                    .await?;
                self.states.set(user_id, ChatState::CollectingFeedback).await
            }
            "_find_event" => self.prompt_find_event(user_id).await,
            "_event_by_search" => self.prompt_search(user_id).await,
            "_event_by_category" => self.prompt_categories(user_id, user_name).await,
            "_view_resend_ticket" => {
                self.list_user_tickets(
                    user_id,
                    user_name,
                    "Select an event to get your ticket.",
                    ChatState::ResendTicket,
                )
                .await
            }
            "_confirm_registration" => self.run_free_registration(user_id, user_name, session).await,
            _ => self.show_main_menu(user_id, user_name).await,
        }
    }

    /// The QR interrupt. Unauthorized scans are silently ignored so
    /// approver numbers cannot be probed.
    async fn handle_checkin_scan(&self, user_id: &str, qr_code: &str) {
        let outcome = match self.issuer.check_in(user_id, qr_code).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(user = %user_id, %error, "check-in failed");
                let _ = self
                    .outbound
                    .send_text(user_id, "Error checking in ticket. Please try again.")
                    .await;
                return;
            }
        };

        let reply = match outcome {
            CheckInOutcome::Unauthorized => return,
            CheckInOutcome::InvalidCode => prompts::CHECKIN_INVALID,
            CheckInOutcome::Success => prompts::CHECKIN_SUCCESS,
            CheckInOutcome::AlreadyCheckedIn => prompts::CHECKIN_ALREADY,
        };

        if let Err(error) = self.outbound.send_text(user_id, reply).await {
            tracing::error!(user = %user_id, %error, "failed to send check-in reply");
        }
        if let Err(error) = self.states.set(user_id, ChatState::Menu).await {
            tracing::error!(user = %user_id, %error, "failed to reset state after check-in");
        }
    }
}
