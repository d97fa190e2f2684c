use std::env;

/// Runtime configuration, read once at startup. Required values abort
/// the process immediately so a misconfigured deployment never answers
/// webhooks with half a stack.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub environment: String,

    pub wa_verify_token: String,
    pub wa_access_token: String,
    pub wa_phone_number_id: String,
    pub wa_business_id: String,
    pub wa_api_version: String,

    pub paynow_integration_id: String,
    pub paynow_integration_key: String,
    pub paynow_result_url: String,
    pub paynow_return_url: String,

    pub ticket_renderer_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: require("DATABASE_URL"),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            wa_verify_token: require("WA_VERIFY_TOKEN"),
            wa_access_token: require("WA_ACCESS_TOKEN"),
            wa_phone_number_id: require("WA_PHONE_NUMBER_ID"),
            wa_business_id: require("WA_BUSINESS_ID"),
            wa_api_version: env::var("WA_API_VERSION").unwrap_or_else(|_| "v17.0".to_string()),

            paynow_integration_id: require("PAYNOW_INTEGRATION_ID"),
            paynow_integration_key: require("PAYNOW_INTEGRATION_KEY"),
            paynow_result_url: require("PAYNOW_RESULT_URL"),
            paynow_return_url: require("PAYNOW_RETURN_URL"),

            ticket_renderer_url: require("TICKET_RENDERER_URL"),
        }
    }
}

fn require(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}
