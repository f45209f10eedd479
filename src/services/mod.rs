pub mod payment_schedules;
