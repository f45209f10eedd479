use chrono::{Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::warn;

use super::error::{BillingError, BillingResult};
use super::model::{DurationUnit, PaymentSchedule, RentalAgreement, RentalPeriod, ScheduleStatus};

/// Upper bound on periods emitted for a single agreement.
pub const GENERATION_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSchedule {
    pub schedules: Vec<PaymentSchedule>,
    /// Set when periods remained after `GENERATION_LIMIT` rows were emitted.
    pub limit_exceeded: bool,
}

impl GeneratedSchedule {
    /// The limit condition, when the schedule was cut short.
    pub fn truncation(&self) -> Option<BillingError> {
        self.limit_exceeded
            .then(|| BillingError::GenerationLimitExceeded(self.schedules.len()))
    }
}

/// End date of an agreement that only carries a duration.
///
/// Month arithmetic is calendar based and clamps to the last day of the
/// target month (2024-01-31 + 1 month = 2024-02-29).
pub fn resolve_end_date(
    start_date: NaiveDate,
    duration_value: i32,
    duration_unit: DurationUnit,
) -> BillingResult<NaiveDate> {
    if duration_value <= 0 {
        return Err(BillingError::InvalidAgreement(
            "duration_value must be greater than zero".to_string(),
        ));
    }

    let resolved = match duration_unit {
        DurationUnit::Days => start_date.checked_add_signed(Duration::days(i64::from(duration_value))),
        DurationUnit::Months => start_date.checked_add_months(Months::new(duration_value as u32)),
    };

    resolved.ok_or_else(|| {
        BillingError::InvalidAgreement("duration overflows the calendar".to_string())
    })
}

/// Lay out the billing periods of an agreement.
///
/// Pure: the output depends on the agreement alone. Callers are responsible
/// for making sure an agreement is only ever generated once.
pub fn generate_schedule(agreement: &RentalAgreement) -> BillingResult<GeneratedSchedule> {
    let end_date = agreement.end_date.ok_or_else(|| {
        BillingError::InvalidAgreement(
            "end_date is required to generate a schedule; resolve it from the duration first"
                .to_string(),
        )
    })?;
    if end_date < agreement.start_date {
        return Err(BillingError::InvalidAgreement(format!(
            "end_date {end_date} is before start_date {}",
            agreement.start_date
        )));
    }
    if agreement.rental_amount < Decimal::ZERO {
        return Err(BillingError::InvalidAgreement(
            "rental_amount cannot be negative".to_string(),
        ));
    }

    let mut schedules = Vec::new();
    let mut current = agreement.start_date;

    while current <= end_date {
        if schedules.len() == GENERATION_LIMIT {
            warn!(
                rental_agreement_id = %agreement.id,
                limit = GENERATION_LIMIT,
                "Payment schedule generation exceeded period limit; returning partial schedule"
            );
            return Ok(GeneratedSchedule {
                schedules,
                limit_exceeded: true,
            });
        }

        let Some(next) = next_period_start(current, agreement.rental_period) else {
            break;
        };
        let period_end = next
            .pred_opt()
            .map_or(current, |last_day| last_day.min(end_date));

        schedules.push(new_row(agreement, current, period_end));
        current = next;
    }

    Ok(GeneratedSchedule {
        schedules,
        limit_exceeded: false,
    })
}

/// Start of the period following the one that begins on `current`.
///
/// Months chain from the previous period and clamp to month end, so once a
/// period lands on a short month later periods keep that day
/// (2024-01-31, 2024-02-29, 2024-03-29, ...).
fn next_period_start(current: NaiveDate, period: RentalPeriod) -> Option<NaiveDate> {
    match period {
        RentalPeriod::Day => current.succ_opt(),
        RentalPeriod::Month => current.checked_add_months(Months::new(1)),
    }
}

fn new_row(agreement: &RentalAgreement, start: NaiveDate, end: NaiveDate) -> PaymentSchedule {
    PaymentSchedule {
        id: None,
        rental_agreement_id: agreement.id,
        contract_number: agreement.contract_number.clone(),
        due_date: start,
        billing_period_start: start,
        billing_period_end: end,
        amount_due: agreement.rental_amount,
        amount_paid: Decimal::ZERO,
        balance: agreement.rental_amount,
        status: ScheduleStatus::Pending,
        is_overdue: false,
        days_overdue: 0,
        late_fee: Decimal::ZERO,
        payment_id: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{generate_schedule, resolve_end_date, GENERATION_LIMIT};
    use crate::billing::error::BillingError;
    use crate::billing::model::{DurationUnit, RentalAgreement, RentalPeriod, ScheduleStatus};

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    fn agreement(start: &str, end: Option<&str>, period: RentalPeriod) -> RentalAgreement {
        RentalAgreement {
            id: Uuid::from_u128(7),
            contract_number: Some("RA-0007".to_string()),
            start_date: date(start),
            end_date: end.map(date),
            duration_value: 1,
            duration_unit: DurationUnit::Months,
            rental_amount: dec!(300),
            rental_period: period,
        }
    }

    #[test]
    fn month_periods_cover_leap_february() {
        let generated = generate_schedule(&agreement(
            "2024-01-01",
            Some("2024-03-31"),
            RentalPeriod::Month,
        ))
        .expect("generates");

        let starts = generated
            .schedules
            .iter()
            .map(|row| row.billing_period_start)
            .collect::<Vec<_>>();
        let ends = generated
            .schedules
            .iter()
            .map(|row| row.billing_period_end)
            .collect::<Vec<_>>();

        assert_eq!(
            starts,
            vec![date("2024-01-01"), date("2024-02-01"), date("2024-03-01")]
        );
        assert_eq!(
            ends,
            vec![date("2024-01-31"), date("2024-02-29"), date("2024-03-31")]
        );
        assert!(!generated.limit_exceeded);
    }

    #[test]
    fn day_periods_emit_one_row_per_day() {
        let generated = generate_schedule(&agreement(
            "2024-06-01",
            Some("2024-06-03"),
            RentalPeriod::Day,
        ))
        .expect("generates");

        assert_eq!(generated.schedules.len(), 3);
        for (offset, row) in generated.schedules.iter().enumerate() {
            let expected = date("2024-06-01") + chrono::Duration::days(offset as i64);
            assert_eq!(row.due_date, expected);
            assert_eq!(row.billing_period_start, expected);
            assert_eq!(row.billing_period_end, expected);
            assert_eq!(row.amount_due, dec!(300));
        }
    }

    #[test]
    fn fresh_rows_start_pending_and_unpaid() {
        let generated = generate_schedule(&agreement(
            "2024-01-01",
            Some("2024-06-30"),
            RentalPeriod::Month,
        ))
        .expect("generates");

        assert_eq!(generated.schedules.len(), 6);
        for row in &generated.schedules {
            assert_eq!(row.id, None);
            assert_eq!(row.contract_number.as_deref(), Some("RA-0007"));
            assert_eq!(row.amount_due, dec!(300));
            assert_eq!(row.amount_paid, Decimal::ZERO);
            assert_eq!(row.balance, dec!(300));
            assert_eq!(row.status, ScheduleStatus::Pending);
            assert!(!row.is_overdue);
            assert_eq!(row.days_overdue, 0);
            assert_eq!(row.late_fee, Decimal::ZERO);
            assert_eq!(row.due_date, row.billing_period_start);
        }
    }

    #[test]
    fn final_month_is_truncated_without_prorating() {
        let generated = generate_schedule(&agreement(
            "2024-01-01",
            Some("2024-02-15"),
            RentalPeriod::Month,
        ))
        .expect("generates");

        assert_eq!(generated.schedules.len(), 2);
        let last = &generated.schedules[1];
        assert_eq!(last.billing_period_start, date("2024-02-01"));
        assert_eq!(last.billing_period_end, date("2024-02-15"));
        assert_eq!(last.amount_due, dec!(300));
    }

    #[test]
    fn month_periods_chain_from_previous_period() {
        let generated = generate_schedule(&agreement(
            "2024-01-31",
            Some("2024-04-30"),
            RentalPeriod::Month,
        ))
        .expect("generates");

        let starts = generated
            .schedules
            .iter()
            .map(|row| row.billing_period_start)
            .collect::<Vec<_>>();
        assert_eq!(
            starts,
            vec![
                date("2024-01-31"),
                date("2024-02-29"),
                date("2024-03-29"),
                date("2024-04-29"),
            ]
        );
        assert_eq!(generated.schedules[0].billing_period_end, date("2024-02-28"));
        assert_eq!(generated.schedules[1].billing_period_end, date("2024-03-28"));
        assert_eq!(generated.schedules[2].billing_period_end, date("2024-04-28"));
        assert_eq!(generated.schedules[3].billing_period_end, date("2024-04-30"));
    }

    #[test]
    fn clamped_month_start_bills_trailing_day() {
        let generated = generate_schedule(&agreement(
            "2024-01-31",
            Some("2024-04-29"),
            RentalPeriod::Month,
        ))
        .expect("generates");

        assert_eq!(generated.schedules.len(), 4);
        let last = &generated.schedules[3];
        assert_eq!(last.billing_period_start, date("2024-04-29"));
        assert_eq!(last.billing_period_end, date("2024-04-29"));
        assert_eq!(last.amount_due, dec!(300));
    }

    #[test]
    fn same_day_agreement_yields_single_period() {
        let generated = generate_schedule(&agreement(
            "2024-05-10",
            Some("2024-05-10"),
            RentalPeriod::Month,
        ))
        .expect("generates");
        assert_eq!(generated.schedules.len(), 1);
        assert_eq!(generated.schedules[0].billing_period_end, date("2024-05-10"));
    }

    #[test]
    fn generation_is_deterministic() {
        let input = agreement("2023-11-15", Some("2025-02-01"), RentalPeriod::Month);
        let first = generate_schedule(&input).expect("generates");
        let second = generate_schedule(&input).expect("generates");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.schedules).expect("serializes"),
            serde_json::to_string(&second.schedules).expect("serializes")
        );
    }

    #[test]
    fn rejects_missing_or_inverted_end_date() {
        let missing = generate_schedule(&agreement("2024-01-01", None, RentalPeriod::Month));
        assert!(matches!(missing, Err(BillingError::InvalidAgreement(_))));

        let inverted = generate_schedule(&agreement(
            "2024-03-01",
            Some("2024-02-01"),
            RentalPeriod::Month,
        ));
        assert!(matches!(inverted, Err(BillingError::InvalidAgreement(_))));
    }

    #[test]
    fn rejects_negative_rent() {
        let mut input = agreement("2024-01-01", Some("2024-02-01"), RentalPeriod::Month);
        input.rental_amount = dec!(-1);
        assert!(matches!(
            generate_schedule(&input),
            Err(BillingError::InvalidAgreement(_))
        ));
    }

    #[test]
    fn stops_at_generation_limit() {
        let generated = generate_schedule(&agreement(
            "2020-01-01",
            Some("2024-12-31"),
            RentalPeriod::Day,
        ))
        .expect("generates");

        assert_eq!(generated.schedules.len(), GENERATION_LIMIT);
        assert!(generated.limit_exceeded);
        assert_eq!(
            generated.truncation(),
            Some(BillingError::GenerationLimitExceeded(GENERATION_LIMIT))
        );
        assert_eq!(
            generated.schedules.last().map(|row| row.due_date),
            Some(date("2020-01-01") + chrono::Duration::days(GENERATION_LIMIT as i64 - 1))
        );
    }

    #[test]
    fn exactly_limit_periods_is_not_flagged() {
        let end = date("2020-01-01") + chrono::Duration::days(GENERATION_LIMIT as i64 - 1);
        let mut input = agreement("2020-01-01", None, RentalPeriod::Day);
        input.end_date = Some(end);

        let generated = generate_schedule(&input).expect("generates");
        assert_eq!(generated.schedules.len(), GENERATION_LIMIT);
        assert!(!generated.limit_exceeded);
        assert_eq!(generated.truncation(), None);
    }

    #[test]
    fn resolves_end_date_from_duration() {
        assert_eq!(
            resolve_end_date(date("2024-01-01"), 10, DurationUnit::Days),
            Ok(date("2024-01-11"))
        );
        assert_eq!(
            resolve_end_date(date("2024-01-31"), 1, DurationUnit::Months),
            Ok(date("2024-02-29"))
        );
        assert_eq!(
            resolve_end_date(date("2024-01-01"), 6, DurationUnit::Months),
            Ok(date("2024-07-01"))
        );
        assert!(resolve_end_date(date("2024-01-01"), 0, DurationUnit::Days).is_err());
    }
}
