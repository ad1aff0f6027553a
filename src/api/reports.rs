//! Reporting endpoints for the dashboard

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{LoanSummary, TitleLoanCount},
    AppState,
};

/// Loans per month as parallel arrays, the shape the dashboard chart uses
#[derive(Serialize, ToSchema)]
pub struct LoanActivityResponse {
    /// Month labels (`YYYY-MM`), oldest first
    pub labels: Vec<String>,
    /// Loans issued in each month
    pub data: Vec<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopBooksQuery {
    /// Number of titles to return (default from configuration)
    pub limit: Option<u32>,
}

/// Active and overdue loan counters
#[utoipa::path(
    get,
    path = "/reports/summary",
    tag = "reports",
    responses(
        (status = 200, description = "Loan counters", body = LoanSummary)
    )
)]
pub async fn get_summary(State(state): State<AppState>) -> AppResult<Json<LoanSummary>> {
    let summary = state.services.reports.summary().await?;
    Ok(Json(summary))
}

/// Loans issued per month
#[utoipa::path(
    get,
    path = "/reports/loan-activity",
    tag = "reports",
    responses(
        (status = 200, description = "Monthly loan histogram", body = LoanActivityResponse)
    )
)]
pub async fn get_loan_activity(
    State(state): State<AppState>,
) -> AppResult<Json<LoanActivityResponse>> {
    let activity = state.services.reports.loan_activity_by_month().await?;
    let (labels, data) = activity.into_iter().map(|m| (m.month, m.count)).unzip();
    Ok(Json(LoanActivityResponse { labels, data }))
}

/// Most borrowed titles
#[utoipa::path(
    get,
    path = "/reports/top-books",
    tag = "reports",
    params(TopBooksQuery),
    responses(
        (status = 200, description = "Titles by times borrowed", body = Vec<TitleLoanCount>),
        (status = 400, description = "Invalid limit", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_top_books(
    State(state): State<AppState>,
    Query(query): Query<TopBooksQuery>,
) -> AppResult<Json<Vec<TitleLoanCount>>> {
    let limit = query.limit.unwrap_or(state.config.loans.top_titles_limit);
    if limit == 0 {
        return Err(AppError::BadRequest("limit must be at least 1".to_string()));
    }
    let titles = state.services.reports.top_titles(limit).await?;
    Ok(Json(titles))
}
