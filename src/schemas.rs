use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    billing::{money::has_cent_precision, DurationUnit, LateFeePolicy, LateFeeType, RentalPeriod},
    error::AppError,
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

/// Money coming in over the wire: non-negative (or strictly positive) and
/// at most two fraction digits.
pub fn validate_money(field: &str, amount: Decimal, allow_zero: bool) -> Result<(), AppError> {
    if amount < Decimal::ZERO || (!allow_zero && amount == Decimal::ZERO) {
        let bound = if allow_zero { "zero or more" } else { "greater than zero" };
        return Err(AppError::BadRequest(format!("{field} must be {bound}.")));
    }
    if !has_cent_precision(amount) {
        return Err(AppError::BadRequest(format!(
            "{field} cannot have more than two decimal places."
        )));
    }
    Ok(())
}

/// Body that may be omitted entirely; an empty body means all defaults.
pub fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| AppError::BadRequest(format!("Invalid JSON body: {error}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(max).clamp(min, max)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRentalAgreementInput {
    pub tenant_id: Uuid,
    pub flat_id: Uuid,
    pub building_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 1200))]
    pub duration_value: i32,
    pub duration_unit: DurationUnit,
    pub rental_amount: Decimal,
    pub rental_period: RentalPeriod,
    pub advance_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndRentalAgreementInput {
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RentalsQuery {
    pub is_active: Option<bool>,
    pub building_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RentalPath {
    pub rental_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulePath {
    pub schedule_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleReadQuery {
    /// Evaluate statuses as of this day instead of today.
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleBoardQuery {
    pub building_id: Option<Uuid>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPaymentInput {
    pub amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaymentScheduleInput {
    pub amount_paid: Option<Decimal>,
    pub late_fee: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ApplyLateFeesInput {
    pub fee_type: Option<LateFeeType>,
    pub value: Option<Decimal>,
    #[validate(range(min = 0, max = 365))]
    pub grace_period_days: Option<i64>,
    pub max_amount: Option<Decimal>,
    pub as_of: Option<NaiveDate>,
}

impl ApplyLateFeesInput {
    /// Request overrides layered on top of the configured policy.
    pub fn policy_over(&self, base: &LateFeePolicy) -> LateFeePolicy {
        LateFeePolicy {
            fee_type: self.fee_type.unwrap_or(base.fee_type),
            value: self.value.unwrap_or(base.value),
            grace_period_days: self.grace_period_days.unwrap_or(base.grace_period_days),
            max_amount: self.max_amount.or(base.max_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::{
        clamp_limit_in_range, parse_optional_body, validate_money, ApplyLateFeesInput,
        EndRentalAgreementInput, RecordPaymentInput,
    };
    use crate::billing::{LateFeePolicy, LateFeeType};

    #[test]
    fn money_validation() {
        assert!(validate_money("amount", dec!(10.25), false).is_ok());
        assert!(validate_money("amount", dec!(0), true).is_ok());
        assert!(validate_money("amount", dec!(0), false).is_err());
        assert!(validate_money("amount", dec!(-1), true).is_err());
        assert!(validate_money("amount", dec!(1.005), false).is_err());
    }

    #[test]
    fn optional_bodies_default_when_empty() {
        let empty: EndRentalAgreementInput = parse_optional_body(b"").expect("empty is fine");
        assert!(empty.end_date.is_none());

        let given: EndRentalAgreementInput =
            parse_optional_body(br#"{"end_date":"2024-05-31"}"#).expect("parses");
        assert_eq!(given.end_date.map(|d| d.to_string()).as_deref(), Some("2024-05-31"));

        assert!(parse_optional_body::<EndRentalAgreementInput>(b"{not json").is_err());
    }

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(9000), 1, 500), 500);
    }

    #[test]
    fn payment_input_accepts_string_and_number_amounts() {
        let from_string: RecordPaymentInput =
            serde_json::from_str(r#"{"amount":"150.10","payment_date":"2024-01-15"}"#)
                .expect("parses");
        assert_eq!(from_string.amount, dec!(150.10));

        let from_number: RecordPaymentInput =
            serde_json::from_str(r#"{"amount":150.1}"#).expect("parses");
        assert_eq!(from_number.amount, dec!(150.1));
        assert!(from_number.payment_date.is_none());
    }

    #[test]
    fn late_fee_overrides_layer_on_config() {
        let base = LateFeePolicy::default();
        let input = ApplyLateFeesInput {
            fee_type: Some(LateFeeType::Fixed),
            max_amount: Some(dec!(40)),
            ..ApplyLateFeesInput::default()
        };
        let policy = input.policy_over(&base);
        assert_eq!(policy.fee_type, LateFeeType::Fixed);
        assert_eq!(policy.value, base.value);
        assert_eq!(policy.grace_period_days, 3);
        assert_eq!(policy.max_amount, Some(dec!(40)));
    }
}
