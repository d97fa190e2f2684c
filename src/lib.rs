pub mod config;
pub mod handlers;
pub mod machine;
pub mod models;
pub mod payment;
pub mod recovery;
pub mod repository;
pub mod routes;
pub mod session;
pub mod state;
pub mod ticketing;
pub mod utils;
pub mod whatsapp;
