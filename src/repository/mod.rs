pub mod catalog;
pub mod kv;
pub mod tickets;
pub mod users;

pub use catalog::{Catalog, PgCatalog};
pub use kv::{PgSessionStore, PgStateStore};
pub use tickets::{PgTicketStore, TicketStore};
pub use users::{PgUserStore, UserStore};
