pub mod issuance;
pub mod renderer;

pub use issuance::{CheckInOutcome, IssueSummary, Issuer, RegistrationOutcome};
pub use renderer::{HttpRenderer, RenderedTicket, TicketRenderer};
