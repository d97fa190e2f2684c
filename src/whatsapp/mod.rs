pub mod inbound;
pub mod outbound;

pub use inbound::{parse_webhook, InboundKind, InboundMessage};
pub use outbound::{CloudApi, ListRow, Outbound, SimpleButton};
