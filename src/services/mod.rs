pub mod billing_calendar;
pub mod late_fees;
pub mod reminder_delivery;
pub mod rent_reminders;
pub mod rent_rollup;
pub mod scheduler;
pub mod tracking;
