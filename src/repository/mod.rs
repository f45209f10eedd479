pub mod payment_schedules;
pub mod payments;
pub mod rental_agreements;
