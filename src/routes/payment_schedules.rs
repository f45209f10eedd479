use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::{require_role, require_user, ADMIN_ONLY, ANY_ROLE},
    billing::{next_due, summarize},
    error::{AppError, AppResult},
    schemas::{
        parse_optional_body, validate_input, validate_money, ApplyLateFeesInput,
        RecordPaymentInput, RentalPath, ScheduleBoardQuery, SchedulePath, ScheduleReadQuery,
        UpdatePaymentScheduleInput,
    },
    services::payment_schedules::{self as schedule_service, Board, PaymentRequest},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/rentals/{rental_id}/payment-schedules",
            axum::routing::get(list_schedules),
        )
        .route(
            "/rentals/{rental_id}/payment-schedules/generate",
            axum::routing::post(generate_schedules),
        )
        .route(
            "/rentals/{rental_id}/payment-schedules/next-due",
            axum::routing::get(get_next_due),
        )
        .route(
            "/rentals/{rental_id}/payment-schedules/summary",
            axum::routing::get(get_summary),
        )
        .route(
            "/rentals/{rental_id}/payment-schedules/late-fees",
            axum::routing::post(apply_late_fees),
        )
        .route(
            "/payment-schedules/overdue",
            axum::routing::get(list_overdue),
        )
        .route(
            "/payment-schedules/pending",
            axum::routing::get(list_pending),
        )
        .route(
            "/payment-schedules/{schedule_id}",
            axum::routing::put(update_schedule),
        )
        .route(
            "/payment-schedules/{schedule_id}/payment",
            axum::routing::post(record_schedule_payment),
        )
}

async fn list_schedules(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    Query(query): Query<ScheduleReadQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let schedules = schedule_service::list_projected(pool, path.rental_id, as_of).await?;
    Ok(Json(json!({ "data": schedules })))
}

async fn generate_schedules(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ANY_ROLE)?;
    let pool = state.db_pool()?;

    let outcome = schedule_service::generate_for_agreement(pool, path.rental_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Payment schedules generated successfully",
            "count": outcome.count,
            "truncated": outcome.truncated,
            "warning": outcome.warning,
        })),
    ))
}

async fn get_next_due(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    Query(query): Query<ScheduleReadQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let schedules = schedule_service::list_projected(pool, path.rental_id, as_of).await?;
    Ok(Json(json!({ "data": next_due(&schedules) })))
}

async fn get_summary(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    Query(query): Query<ScheduleReadQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let schedules = schedule_service::list_projected(pool, path.rental_id, as_of).await?;
    Ok(Json(json!({
        "as_of": as_of,
        "summary": summarize(&schedules, as_of),
    })))
}

async fn apply_late_fees(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ADMIN_ONLY)?;
    let payload: ApplyLateFeesInput = parse_optional_body(&body)?;
    validate_input(&payload)?;

    let policy = payload.policy_over(&state.config.late_fee_policy);
    validate_money("value", policy.value, true)?;
    if let Some(max_amount) = policy.max_amount {
        validate_money("max_amount", max_amount, true)?;
    }

    let pool = state.db_pool()?;
    let as_of = payload.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let run = schedule_service::apply_late_fees(pool, path.rental_id, &policy, as_of).await?;
    Ok(Json(json!(run)))
}

async fn list_overdue(
    State(state): State<AppState>,
    Query(query): Query<ScheduleBoardQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    list_board(state, query, headers, Board::Overdue).await
}

async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<ScheduleBoardQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    list_board(state, query, headers, Board::Pending).await
}

async fn list_board(
    state: AppState,
    query: ScheduleBoardQuery,
    headers: HeaderMap,
    board: Board,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let entries = schedule_service::list_board(pool, query.building_id, as_of, board).await?;
    Ok(Json(json!({ "data": entries })))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(path): Path<SchedulePath>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePaymentScheduleInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ADMIN_ONLY)?;
    if payload.amount_paid.is_none() && payload.late_fee.is_none() {
        return Err(AppError::BadRequest(
            "Provide amount_paid or late_fee.".to_string(),
        ));
    }
    if let Some(amount_paid) = payload.amount_paid {
        validate_money("amount_paid", amount_paid, true)?;
    }
    if let Some(late_fee) = payload.late_fee {
        validate_money("late_fee", late_fee, true)?;
    }

    let pool = state.db_pool()?;
    let schedule = schedule_service::update_schedule(
        pool,
        path.schedule_id,
        &payload,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(json!(schedule)))
}

async fn record_schedule_payment(
    State(state): State<AppState>,
    Path(path): Path<SchedulePath>,
    headers: HeaderMap,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ANY_ROLE)?;
    validate_input(&payload)?;
    let today = Utc::now().date_naive();
    let request = PaymentRequest::from_input(payload, user.id, today)?;

    let pool = state.db_pool()?;
    let recorded =
        schedule_service::record_schedule_payment(pool, path.schedule_id, &request, today).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Payment recorded successfully",
            "payment": recorded.payment,
            "allocation": recorded.allocation,
            "schedules": recorded.schedules,
        })),
    ))
}
