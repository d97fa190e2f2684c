use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use mukoto_server::config::Config;
use mukoto_server::handlers::AppState;
use mukoto_server::machine::Bot;
use mukoto_server::payment::{PaynowGateway, Settlement};
use mukoto_server::recovery::RecoveryEngine;
use mukoto_server::repository::{
    PgCatalog, PgSessionStore, PgStateStore, PgTicketStore, PgUserStore,
};
use mukoto_server::routes::create_routes;
use mukoto_server::ticketing::{HttpRenderer, Issuer};
use mukoto_server::whatsapp::CloudApi;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let http = reqwest::Client::new();

    let outbound = Arc::new(CloudApi::new(
        http.clone(),
        &config.wa_api_version,
        &config.wa_phone_number_id,
        config.wa_access_token.clone(),
    ));
    let gateway = Arc::new(PaynowGateway::new(
        http.clone(),
        config.paynow_integration_id.clone(),
        config.paynow_integration_key.clone(),
        config.paynow_result_url.clone(),
        config.paynow_return_url.clone(),
    ));
    let renderer = Arc::new(HttpRenderer::new(http, config.ticket_renderer_url.clone()));

    let catalog = Arc::new(PgCatalog::new(pool.clone()));
    let tickets = Arc::new(PgTicketStore::new(pool.clone()));
    let users = Arc::new(PgUserStore::new(pool.clone()));
    let sessions = Arc::new(PgSessionStore::new(pool.clone()));
    let states = Arc::new(PgStateStore::new(pool));

    let issuer = Arc::new(Issuer::new(
        tickets.clone(),
        users,
        renderer,
        outbound.clone(),
    ));
    let settlement = Arc::new(Settlement::new(
        gateway,
        outbound.clone(),
        sessions.clone(),
        states.clone(),
        issuer.clone(),
    ));
    let recovery = RecoveryEngine::new(outbound.clone(), sessions.clone(), states.clone());

    let bot = Arc::new(Bot::new(
        outbound, catalog, tickets, sessions, states, settlement, issuer, recovery,
    ));

    let app = create_routes(AppState {
        bot,
        verify_token: config.wa_verify_token,
        environment: config.environment,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
