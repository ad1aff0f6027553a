//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans, reports, titles};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Loan Desk API",
        version = "1.0.0",
        description = "Loan issuance, returns and loan reporting",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "Loan desk API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::issue_loan,
        loans::list_active_loans,
        loans::get_loan,
        loans::return_loan,
        // Titles
        titles::get_availability,
        // Reports
        reports::get_summary,
        reports::get_loan_activity,
        reports::get_top_books,
    ),
    components(
        schemas(
            // Loans
            loans::IssueLoanRequest,
            loans::IssueLoanResponse,
            loans::ReturnResponse,
            crate::models::Loan,
            crate::models::ActiveLoan,
            crate::models::LoanStatus,
            crate::models::LoanId,
            crate::models::CopyId,
            crate::models::MemberId,
            crate::models::TitleId,
            // Titles
            crate::models::TitleAvailability,
            // Reports
            reports::LoanActivityResponse,
            crate::models::LoanSummary,
            crate::models::TitleLoanCount,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Loan desk"),
        (name = "titles", description = "Copy availability"),
        (name = "reports", description = "Dashboard reports")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
