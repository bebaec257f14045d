use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use flock_matching::config::AppConfig;
use flock_matching::routes;
use flock_matching::routing::PlannerClient;
use flock_matching::AppState;
use flock_shared::clients::{MongoClient, RabbitMQClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flock_shared::middleware::init_tracing("flock-matching");

    let config = AppConfig::load()?;
    let port = config.port;

    let mongo = MongoClient::connect(&config.mongo_uri, &config.mongo_db).await?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let planner = PlannerClient::new(
        &config.routing_base_url,
        &config.routing_graphql_path,
        Duration::from_secs_f64(config.routing_timeout_seconds),
    );

    let state = Arc::new(AppState::new(&mongo, config, rabbitmq, planner));

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/matching/run", post(routes::matching::run_cycle))
        .route("/matching/suggestions", get(routes::matching::list_suggestions))
        .route("/matching/suggestions/:id/accept", post(routes::matching::accept_suggestion))
        .route("/matching/suggestions/:id/pass", post(routes::matching::pass_suggestion))
        .route("/matching/active", get(routes::matching::list_active))
        .route("/matching/assignments", get(routes::matching::list_assignments))
        .route(
            "/commutes/me",
            get(routes::commutes::get_my_commute)
                .put(routes::commutes::create_or_replace_commute)
                .patch(routes::commutes::patch_my_commute),
        )
        .route("/commutes/me/queue-flow", post(routes::commutes::set_queue_flow))
        .route("/commutes/me/suggestions-flow", post(routes::commutes::set_suggestions_flow))
        .route("/commutes/me/pause", post(routes::commutes::pause_matching))
        .route(
            "/users/me",
            get(routes::users::get_my_profile)
                .put(routes::users::create_or_replace_profile)
                .delete(routes::users::delete_my_profile),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "flock-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
