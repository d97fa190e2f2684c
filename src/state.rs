use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::utils::error::BotResult;

/// The closed set of conversation states. Each variant names the input
/// the bot expects next from the user. Persisted as the string label
/// given by [`ChatState::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatState {
    Menu,
    ChooseOption,
    FindEvent,
    SearchEvent,
    FindEventByCategory,
    ShowEvent,
    ChoosenEventOptions,
    ChooseTicketType,
    ConfirmFreeRegistration,
    EnterTicketQuantity,
    ChoosePaymentMethod,
    ChoosePhoneNumber,
    OtherPhoneNumber,
    EventFallback,
    Utilities,
    SendEventLocation,
    ResendTicket,
    /// Payment in flight. Inbound messages are ignored except the QR
    /// check-in interrupt.
    Paynow,
    PaymentRecovery,
    EventRecovery,
    TicketRecovery,
    RegistrationRecovery,
    GeneralRecovery,
    ServiceRecovery,
    ErrorRecovery,
    HumanHelpOffer,
    AwaitingHumanSupport,
    CollectingFeedback,
}

impl ChatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatState::Menu => "menu",
            ChatState::ChooseOption => "choose_option",
            ChatState::FindEvent => "find_event",
            ChatState::SearchEvent => "search_event",
            ChatState::FindEventByCategory => "find_event_by_category",
            ChatState::ShowEvent => "show_event",
            ChatState::ChoosenEventOptions => "choosen_event_options",
            ChatState::ChooseTicketType => "choose_ticket_type",
            ChatState::ConfirmFreeRegistration => "confirm_free_registration",
            ChatState::EnterTicketQuantity => "enter_ticket_quantity",
            ChatState::ChoosePaymentMethod => "choose_payment_method",
            ChatState::ChoosePhoneNumber => "choose_phone_number",
            ChatState::OtherPhoneNumber => "other_phone_number",
            ChatState::EventFallback => "event_fallback",
            ChatState::Utilities => "utilities",
            ChatState::SendEventLocation => "send_event_location",
            ChatState::ResendTicket => "resend_ticket",
            ChatState::Paynow => "paynow",
            ChatState::PaymentRecovery => "payment_recovery",
            ChatState::EventRecovery => "event_recovery",
            ChatState::TicketRecovery => "ticket_recovery",
            ChatState::RegistrationRecovery => "registration_recovery",
            ChatState::GeneralRecovery => "general_recovery",
            ChatState::ServiceRecovery => "service_recovery",
            ChatState::ErrorRecovery => "error_recovery",
            ChatState::HumanHelpOffer => "human_help_offer",
            ChatState::AwaitingHumanSupport => "awaiting_human_support",
            ChatState::CollectingFeedback => "collecting_feedback",
        }
    }

    /// True while the settlement protocol owns the conversation and
    /// regular input is ignored.
    pub fn is_quiescent(&self) -> bool {
        matches!(self, ChatState::Paynow)
    }

    pub fn is_recovery(&self) -> bool {
        matches!(
            self,
            ChatState::PaymentRecovery
                | ChatState::EventRecovery
                | ChatState::TicketRecovery
                | ChatState::RegistrationRecovery
                | ChatState::GeneralRecovery
                | ChatState::ServiceRecovery
                | ChatState::ErrorRecovery
                | ChatState::HumanHelpOffer
        )
    }

    pub const ALL: [ChatState; 28] = [
        ChatState::Menu,
        ChatState::ChooseOption,
        ChatState::FindEvent,
        ChatState::SearchEvent,
        ChatState::FindEventByCategory,
        ChatState::ShowEvent,
        ChatState::ChoosenEventOptions,
        ChatState::ChooseTicketType,
        ChatState::ConfirmFreeRegistration,
        ChatState::EnterTicketQuantity,
        ChatState::ChoosePaymentMethod,
        ChatState::ChoosePhoneNumber,
        ChatState::OtherPhoneNumber,
        ChatState::EventFallback,
        ChatState::Utilities,
        ChatState::SendEventLocation,
        ChatState::ResendTicket,
        ChatState::Paynow,
        ChatState::PaymentRecovery,
        ChatState::EventRecovery,
        ChatState::TicketRecovery,
        ChatState::RegistrationRecovery,
        ChatState::GeneralRecovery,
        ChatState::ServiceRecovery,
        ChatState::ErrorRecovery,
        ChatState::HumanHelpOffer,
        ChatState::AwaitingHumanSupport,
        ChatState::CollectingFeedback,
    ];
}

impl Default for ChatState {
    fn default() -> Self {
        ChatState::Menu
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChatState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown conversation state: {}", self.0)
    }
}

impl std::error::Error for UnknownState {}

/// Durable per-user conversation-state label, independent lifecycle
/// from the session store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current state for the user, defaulting to [`ChatState::Menu`]
    /// when none has been recorded (or an old label no longer parses).
    async fn get(&self, user_id: &str) -> BotResult<ChatState>;

    async fn set(&self, user_id: &str, state: ChatState) -> BotResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for state in ChatState::ALL {
            assert_eq!(state.as_str().parse::<ChatState>().unwrap(), state);
        }
    }

    #[test]
    fn unknown_label_is_an_error() {
        assert!("definitely_not_a_state".parse::<ChatState>().is_err());
    }

    #[test]
    fn paynow_is_quiescent() {
        assert!(ChatState::Paynow.is_quiescent());
        assert!(!ChatState::Menu.is_quiescent());
    }
}
