use rocket::launch;
use std::sync::Arc;

mod bootstrap;
mod chain;
mod config;
mod engine;
mod error;
mod math;
mod models;
mod web;

#[launch]
async fn rocket() -> _ {
    env_logger::init();

    // Load configuration
    let config = config::Config::from_env()
        .expect("Failed to load configuration");

    // Build application state
    let app_state = Arc::new(
        bootstrap::AppState::new(&config)
            .expect("Failed to initialize application state")
    );

    // Cached listing first, then periodic live refreshes
    tokio::spawn(app_state.aggregator.clone().run_periodic());

    // Configure Rocket
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .manage(app_state)
        .mount("/", web::routes::api_routes())
}
