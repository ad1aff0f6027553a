//! Title availability endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{TitleAvailability, TitleId, TitleRef},
    AppState,
};

/// Total and available copies of a title
#[utoipa::path(
    get,
    path = "/titles/{id}/availability",
    tag = "titles",
    params(
        ("id" = i64, Path, description = "Title ID")
    ),
    responses(
        (status = 200, description = "Copy counts", body = TitleAvailability),
        (status = 404, description = "Title not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_availability(
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> AppResult<Json<TitleAvailability>> {
    let availability = state
        .services
        .loans
        .availability(&TitleRef::Id(TitleId(title_id)))
        .await?;
    Ok(Json(availability))
}
