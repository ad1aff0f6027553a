//! Loan desk endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{ActiveLoan, Loan, LoanId, MemberId, TitleId, TitleRef},
    AppState,
};

/// Issue loan request. Camel-case field names from the desk front end are
/// accepted as aliases.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueLoanRequest {
    /// ISBN of the title to lend (or `title_id`)
    #[validate(length(min = 1, max = 32))]
    pub isbn: Option<String>,
    /// Catalog id of the title to lend (or `isbn`)
    #[serde(alias = "titleId")]
    pub title_id: Option<i64>,
    /// Borrowing member
    #[serde(alias = "memberId")]
    #[validate(range(min = 1))]
    pub member_id: i64,
    /// Loan start, `YYYY-MM-DD`
    #[serde(alias = "loanDate")]
    pub loan_date: NaiveDate,
    /// Due date, `YYYY-MM-DD`
    #[serde(alias = "dueDate")]
    pub due_date: NaiveDate,
}

impl IssueLoanRequest {
    fn title_ref(&self) -> AppResult<TitleRef> {
        match (&self.isbn, self.title_id) {
            (Some(isbn), None) => Ok(TitleRef::Isbn(isbn.trim().to_string())),
            (None, Some(id)) => Ok(TitleRef::Id(TitleId(id))),
            _ => Err(AppError::BadRequest(
                "exactly one of isbn or title_id is required".to_string(),
            )),
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Serialize, ToSchema)]
pub struct IssueLoanResponse {
    pub message: String,
    pub loan_id: LoanId,
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub message: String,
    pub loan: Loan,
}

/// Issue a loan on the first available copy of a title
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = IssueLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = IssueLoanResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Title or member not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copy available", body = crate::error::ErrorResponse),
        (status = 503, description = "Store busy, retry later", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_loan(
    State(state): State<AppState>,
    Json(request): Json<IssueLoanRequest>,
) -> AppResult<(StatusCode, Json<IssueLoanResponse>)> {
    request.validate()?;
    let title = request.title_ref()?;

    let loan_id = state
        .services
        .loans
        .issue_loan(
            &title,
            MemberId(request.member_id),
            start_of_day(request.loan_date),
            start_of_day(request.due_date),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueLoanResponse {
            message: "Loan created".to_string(),
            loan_id,
        }),
    ))
}

/// List open loans with their Active/Overdue status
#[utoipa::path(
    get,
    path = "/loans/active",
    tag = "loans",
    responses(
        (status = 200, description = "Open loans ordered by loan id", body = Vec<ActiveLoan>)
    )
)]
pub async fn list_active_loans(State(state): State<AppState>) -> AppResult<Json<Vec<ActiveLoan>>> {
    let loans = state.services.loans.list_active_loans().await?;
    Ok(Json(loans))
}

/// Get a loan by id
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan", body = Loan),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.get_loan(LoanId(loan_id)).await?;
    Ok(Json(loan))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already returned", body = crate::error::ErrorResponse),
        (status = 503, description = "Store busy, retry later", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<ReturnResponse>> {
    let loan = state.services.loans.return_loan(LoanId(loan_id)).await?;

    Ok(Json(ReturnResponse {
        message: "Book returned".to_string(),
        loan,
    }))
}
