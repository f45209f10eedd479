//! Recurring rent billing: schedule generation, live status projection,
//! payment allocation and late fees.
//!
//! Everything in here is synchronous and free of I/O. Persistence and
//! transaction boundaries live in `services::payment_schedules`.

pub mod allocator;
pub mod error;
pub mod generator;
pub mod late_fee;
pub mod model;
pub mod money;
pub mod projector;

pub use allocator::apply_payment;
pub use error::BillingError;
pub use generator::{generate_schedule, resolve_end_date};
pub use late_fee::{calculate_late_fee, LateFeePolicy, LateFeeType};
pub use model::{
    AllocationResult, DurationUnit, PaymentSchedule, RentalAgreement, RentalPeriod, ScheduleStatus,
};
pub use projector::{most_overdue_first, next_due, overdue_only, project_status, summarize};
