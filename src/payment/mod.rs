pub mod gateway;
pub mod settlement;

pub use gateway::{
    InitiateOutcome, InitiateRequest, InnbucksInfo, PaymentGateway, PaymentStatus, PaynowGateway,
};
pub use settlement::{backoff_schedule, PollOutcome, Settlement};
