pub mod event;
pub mod ticket;
pub mod user;

pub use event::{Category, Event};
pub use ticket::{NewTicket, Ticket, TicketRecord, TicketType};
pub use user::User;
