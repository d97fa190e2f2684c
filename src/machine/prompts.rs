//! Message templates and composed menus. Pure functions building the
//! text and button/row sets; sending is left to the caller.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Category, Event, TicketRecord, TicketType};
use crate::whatsapp::{ListRow, SimpleButton};

pub const LIST_HEADER: &str = "#Mukoto Events🚀";
pub const LIST_FOOTER: &str = "Powered by: Your Address Tech";

pub fn welcome(username: &str) -> String {
    format!(
        "Hello {username}! 👋\n\nWelcome to *Mukoto* 🎫 - your personal event \
         ticketing assistant.\n\nI'm here to help you discover amazing events and \
         manage your tickets effortlessly. What would you like to do today?"
    )
}

pub fn main_menu_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_find_event", "🔍 Find Events"),
        SimpleButton::new("_view_resend_ticket", "🎫 My Tickets"),
        SimpleButton::new("_utilities", "🛠️ Utilities"),
    ]
}

pub fn find_event_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_event_by_search", "Find by search"),
        SimpleButton::new("_event_by_category", "Find by category"),
    ]
}

pub fn utility_buttons() -> Vec<SimpleButton> {
    vec![SimpleButton::new("_event_location", "Event Location")]
}

pub fn purchase_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_purchase", "💳 Purchase Ticket"),
        SimpleButton::new("_find_event", "🔍 Find More Events"),
        SimpleButton::new("_main_menu", "🏠 Main Menu"),
    ]
}

pub fn payment_method_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_ecocash", "💰 EcoCash"),
        SimpleButton::new("_innbucks", "🏦 InnBucks"),
        SimpleButton::new("_web", "🌐 Web Payment"),
    ]
}

pub fn payment_number_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_use_this_number", "✅ Use This Number"),
        SimpleButton::new("_other_payment_number", "📱 Different Number"),
    ]
}

pub fn event_fallback_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_find_event", "Yes"),
        SimpleButton::new("_main_menu", "Main Menu"),
    ]
}

pub fn free_registration_buttons() -> Vec<SimpleButton> {
    vec![
        SimpleButton::new("_confirm_registration", "✅ Register"),
        SimpleButton::new("_main_menu", "🏠 Main Menu"),
    ]
}

pub fn event_rows(events: &[Event]) -> Vec<ListRow> {
    events
        .iter()
        .map(|event| ListRow {
            id: event.id.to_string(),
            title: event.title.clone(),
            description: event.description.clone().unwrap_or_default(),
        })
        .collect()
}

pub fn category_rows(categories: &[Category]) -> Vec<ListRow> {
    categories
        .iter()
        .map(|category| ListRow {
            id: category.id.to_string(),
            title: category.category_name.clone(),
            description: category.category_name.clone(),
        })
        .collect()
}

pub fn ticket_type_rows(ticket_types: &[TicketType]) -> Vec<ListRow> {
    ticket_types
        .iter()
        .map(|tt| ListRow {
            id: tt.id.to_string(),
            title: tt.type_name.clone(),
            description: if tt.is_free() {
                tt.description
                    .clone()
                    .unwrap_or_else(|| "Registration available".to_string())
            } else {
                format!("{} {}", tt.price, tt.currency_code)
            },
        })
        .collect()
}

/// Collapse a user's tickets to one row per event, first occurrence
/// wins, keyed by event id.
pub fn dedup_ticket_events(tickets: &[TicketRecord]) -> Vec<ListRow> {
    let mut seen: Vec<Uuid> = Vec::new();
    let mut rows = Vec::new();
    for ticket in tickets {
        if !seen.contains(&ticket.event_id) {
            seen.push(ticket.event_id);
            rows.push(ListRow {
                id: ticket.event_id.to_string(),
                title: ticket.event_title.clone(),
                description: ticket.event_description.clone().unwrap_or_default(),
            });
        }
    }
    rows
}

pub fn event_caption(event: &Event) -> String {
    let date = event.start_time.format("%A, %B %e %Y, %l:%M %p");
    let mut text = format!("*{}*\n", event.title.trim());
    if let Some(description) = &event.description {
        text.push_str(description.trim());
        text.push('\n');
    }
    text.push_str(&format!("*{date}*\n"));
    if let Some(location) = &event.location {
        text.push_str(&format!("*{location}*"));
    }
    text
}

pub fn purchase_summary(quantity: u32, ticket_type: &TicketType, total: Decimal) -> String {
    format!(
        "💰 *Purchase Summary*\n\n🎫 Tickets: {quantity}x {}\n💵 Total: *${total} {}*\n\n\
         *Note: Additional charges may apply*\n\nPlease select your preferred payment method:",
        ticket_type.type_name, ticket_type.currency_code
    )
}

pub fn invalid_quantity(over_limit: bool) -> &'static str {
    if over_limit {
        "⚠️ You can only purchase a maximum of 10 tickets. Please try again."
    } else {
        "❌ Enter a valid number of tickets (1-10)."
    }
}

pub fn free_registration_confirmation(ticket_type: &TicketType) -> String {
    format!(
        "🆓 *Free Registration*\n\nYou've selected: *{}*\n\nThis is a free event! \
         Would you like to register now?",
        ticket_type.type_name
    )
}

pub fn registration_success(event_title: &str) -> String {
    format!(
        "🎉 *Registration Successful!*\n\nYou are registered for *{event_title}*. \
         Your ticket is on its way."
    )
}

pub fn collection_reminder(event_title: &str) -> String {
    format!(
        "📍 *Ticket Collection Required*\n\nYour digital ticket for *{event_title}* \
         has been generated successfully!\n\nThis event requires physical ticket \
         collection. Please use your digital ticket to collect your physical \
         tickets at the designated collection point before the event starts.\n\n\
         For collection location and hours, please contact the event organiser.\n\n\
         Thank you for choosing Mukoto! 🎉"
    )
}

pub const CHOOSE_FROM_MENU: &str = "Please choose an option from the menu.";
pub const SEARCH_PROMPT: &str =
    "Please enter the name or type of event you are interested in:";
pub const NO_EVENTS_FOUND: &str =
    "No events found for your search. Would you like to try again?";
pub const NO_CATEGORY_EVENTS: &str =
    "No events found for this category. Find another event?";
pub const CHECKIN_SUCCESS: &str = "Ticket has been checked in successfully.";
pub const CHECKIN_ALREADY: &str =
    "Ticket has already been checked in. Please purchase another ticket!";
pub const CHECKIN_INVALID: &str = "Invalid ticket QR code. Please try again.";
pub const PAYMENT_PENDING: &str =
    "⏳ Your payment has not been confirmed yet, but it may still complete. \
     Your tickets will be delivered automatically once payment is confirmed, \
     or you can check *My Tickets* at the main menu later.";
pub const PAYMENT_CANCELLED: &str =
    "Your payment was cancelled. You have not been charged.";
pub const PAYMENT_FAILED: &str = "Payment failed, please try again😞";
