//! API handlers for the loan desk REST endpoints

pub mod health;
pub mod loans;
pub mod openapi;
pub mod reports;
pub mod titles;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Loans
        .route("/loans", post(loans::issue_loan))
        .route("/loans/active", get(loans::list_active_loans))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        // Titles
        .route("/titles/:id/availability", get(titles::get_availability))
        // Reports
        .route("/reports/summary", get(reports::get_summary))
        .route("/reports/loan-activity", get(reports::get_loan_activity))
        .route("/reports/top-books", get(reports::get_top_books))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
