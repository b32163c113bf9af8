//! A toy pizza service wired up to the metrics exporter.
//!
//! Configure the collector with the `PIZZA_METRICS_*` environment variables
//! (see [`ExporterConfig::from_env`]) and run:
//!
//! ```sh
//! PIZZA_METRICS_URL=http://localhost:4318/v1/metrics \
//! PIZZA_METRICS_API_KEY=dev PIZZA_METRICS_SOURCE=jwt-pizza-dev \
//! cargo run --example pizza_service
//! ```
//!
//! Then poke it:
//!
//! ```sh
//! curl -X PUT localhost:3000/api/auth -d '{"email":"d@jwt.com","password":"diner"}' -H 'content-type: application/json'
//! curl -X POST localhost:3000/api/order -d '{"items":[{"price":0.05},{"price":0.0042}]}' -H 'content-type: application/json'
//! curl -X DELETE localhost:3000/api/auth
//! ```
//!
//! Login, persistence and the pizza factory are fakes. Only the metric calls
//! are real.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use pizza_metrics::{
    Accumulator, ExporterConfig, TransactionOutcome, init_metrics, init_tracing,
    middleware::instrument_router, run_exporter,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
struct Login {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
struct OrderItem {
    price: f64,
}

#[instrument(skip_all)]
async fn login(
    State(metrics): State<Arc<Accumulator>>,
    Json(login): Json<Login>,
) -> (StatusCode, Json<Value>) {
    if login.password != "diner" {
        metrics.auth_failed();
        warn!(email = %login.email, "login rejected");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "unknown user" })));
    }
    metrics.user_session_started();
    (StatusCode::OK, Json(json!({ "token": "not.a.jwt" })))
}

async fn logout(State(metrics): State<Arc<Accumulator>>) -> Json<Value> {
    metrics.user_session_ended();
    Json(json!({ "message": "logout successful" }))
}

/// Pretend to call the pizza factory. Fails for empty orders.
async fn make_pizzas(order: &Order) -> Result<(), &'static str> {
    tokio::time::sleep(Duration::from_millis(50 * order.items.len() as u64)).await;
    if order.items.is_empty() {
        return Err("empty order");
    }
    Ok(())
}

#[instrument(skip_all)]
async fn create_order(
    State(metrics): State<Arc<Accumulator>>,
    Json(order): Json<Order>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let result = make_pizzas(&order).await;
    metrics.record_domain_latency(started.elapsed());

    match result {
        Ok(()) => {
            let amount: f64 = order.items.iter().map(|item| item.price).sum();
            metrics.transaction_completed(TransactionOutcome::Success { amount });
            (StatusCode::OK, Json(json!({ "order": { "total": amount } })))
        }
        Err(reason) => {
            metrics.transaction_completed(TransactionOutcome::Failure);
            warn!(reason, "pizza factory rejected order");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Failed to fulfill order at factory" })),
            )
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let provider = init_tracing()?;
    init_metrics(None)?;

    let accumulator = Arc::new(Accumulator::new());
    let config = ExporterConfig::from_env()?;
    let exporter = run_exporter(accumulator.clone(), &config)?;

    let routes = Router::new()
        .route("/", get(|| async { Json(json!({ "message": "welcome to JWT Pizza" })) }))
        .route("/api/auth", put(login).delete(logout))
        .route("/api/order", post(create_order))
        .with_state(accumulator.clone());
    let app = instrument_router(routes, accumulator);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!(addr = %listener.local_addr()?, "pizza service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C, shutting down");
        })
        .await?;

    exporter.stop().await;

    // Ensure the provider has a chance to flush any remaining spans.
    provider.shutdown().map_err(Into::into)
}
