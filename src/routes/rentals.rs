use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::{require_role, require_user, ANY_ROLE},
    billing::resolve_end_date,
    error::{AppError, AppResult},
    repository::{
        payments::{self, NewPayment, PaymentType},
        rental_agreements::{self, contract_number_for, NewRentalAgreement},
    },
    schemas::{
        clamp_limit_in_range, parse_optional_body, validate_input, validate_money,
        CreateRentalAgreementInput, EndRentalAgreementInput, RentalPath, RentalsQuery,
    },
    services::payment_schedules::generate_locked,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/rentals",
            axum::routing::get(list_rentals).post(create_rental),
        )
        .route("/rentals/{rental_id}", axum::routing::get(get_rental))
        .route("/rentals/{rental_id}/end", axum::routing::post(end_rental))
}

async fn list_rentals(
    State(state): State<AppState>,
    Query(query): Query<RentalsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;

    let rows = rental_agreements::list(
        pool,
        query.is_active,
        query.building_id,
        clamp_limit_in_range(query.limit, 1, 500),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers).await?;
    let pool = state.db_pool()?;

    let row = rental_agreements::get(pool, path.rental_id).await?;
    Ok(Json(json!(row)))
}

/// Create an agreement, occupy its flat, book the advance and generate the
/// schedule, all in one transaction.
async fn create_rental(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRentalAgreementInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ANY_ROLE)?;
    validate_input(&payload)?;
    validate_money("rental_amount", payload.rental_amount, true)?;
    let advance_amount = payload.advance_amount.unwrap_or(Decimal::ZERO);
    validate_money("advance_amount", advance_amount, true)?;

    let end_date = match payload.end_date {
        Some(end_date) => end_date,
        None => resolve_end_date(
            payload.start_date,
            payload.duration_value,
            payload.duration_unit,
        )?,
    };
    if end_date < payload.start_date {
        return Err(AppError::BadRequest(
            "end_date cannot be before start_date.".to_string(),
        ));
    }

    let pool = state.db_pool()?;
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    if rental_agreements::lock_flat_occupancy(&mut tx, payload.flat_id).await? {
        return Err(AppError::Conflict("Flat is already occupied.".to_string()));
    }

    let row = rental_agreements::insert(
        &mut tx,
        &NewRentalAgreement {
            contract_number: contract_number_for(Uuid::new_v4(), payload.start_date),
            tenant_id: payload.tenant_id,
            flat_id: payload.flat_id,
            building_id: payload.building_id,
            start_date: payload.start_date,
            end_date,
            duration_value: payload.duration_value,
            duration_unit: payload.duration_unit,
            rental_amount: payload.rental_amount,
            rental_period: payload.rental_period,
            advance_amount,
            created_by: user.id,
        },
    )
    .await?;
    rental_agreements::set_flat_occupied(&mut tx, payload.flat_id, true).await?;

    let advance_payment = if advance_amount > Decimal::ZERO {
        Some(
            payments::insert(
                &mut tx,
                &NewPayment {
                    rental_agreement_id: row.id,
                    payment_date: Utc::now().date_naive(),
                    amount: advance_amount,
                    payment_type: PaymentType::Advance,
                    payment_method: None,
                    remarks: Some("Advance payment".to_string()),
                    billing_period_start: None,
                    billing_period_end: None,
                    is_partial: false,
                    allocated_amount: Decimal::ZERO,
                    unallocated_amount: advance_amount,
                    created_by: Some(user.id),
                },
            )
            .await?,
        )
    } else {
        None
    };

    let schedules = generate_locked(&mut tx, &row.to_agreement()?).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(
        rental_agreement_id = %row.id,
        contract_number = row.contract_number.as_deref().unwrap_or_default(),
        schedule_rows = schedules.count,
        "Rental agreement created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "rental": row,
            "advance_payment": advance_payment,
            "schedules": schedules,
        })),
    ))
}

/// Deactivate an agreement and free its flat. Schedule rows are kept.
async fn end_rental(
    State(state): State<AppState>,
    Path(path): Path<RentalPath>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    require_role(&user, ANY_ROLE)?;
    let payload: EndRentalAgreementInput = parse_optional_body(&body)?;
    let pool = state.db_pool()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    let current = rental_agreements::lock(&mut tx, path.rental_id).await?;
    if !current.is_active {
        return Err(AppError::Conflict(
            "Rental agreement has already ended.".to_string(),
        ));
    }
    let end_date = payload.end_date.unwrap_or_else(|| Utc::now().date_naive());
    if end_date < current.start_date {
        return Err(AppError::BadRequest(
            "end_date cannot be before start_date.".to_string(),
        ));
    }

    let row = rental_agreements::deactivate(&mut tx, path.rental_id, end_date).await?;
    rental_agreements::set_flat_occupied(&mut tx, row.flat_id, false).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    tracing::info!(rental_agreement_id = %row.id, %end_date, "Rental agreement ended");
    Ok(Json(json!(row)))
}
