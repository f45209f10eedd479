use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::{require_role, require_user, ANY_ROLE},
    error::AppResult,
    repository::{payments, rental_agreements},
    schemas::{validate_input, RecordPaymentInput, RentalPath},
    services::payment_schedules::{record_payment as allocate_and_record, PaymentRequest},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/rentals/{rental_id}/payments",
        axum::routing::get(list_payments).post(record_payment),
    )
}

async fn list_payments(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;

    rental_agreements::get(pool, path.rental_id).await?;
    let rows = payments::list_for_agreement(pool, path.rental_id).await?;
    Ok(Json(json!({ "data": rows })))
}

/// Spread one payment over the agreement's open rows, oldest first.
async fn record_payment(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ANY_ROLE)?;
    validate_input(&payload)?;
    let today = Utc::now().date_naive();
    let request = PaymentRequest::from_input(payload, user.id, today)?;

    let pool = state.db_pool()?;
    let recorded = allocate_and_record(pool, path.rental_id, &request, today).await?;

    Ok((StatusCode::CREATED, Json(json!(recorded))))
}
