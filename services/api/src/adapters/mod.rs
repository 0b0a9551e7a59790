pub mod db;
pub mod inmemory;
pub mod job_scheduler;

pub use db::PgReminderRepo;
pub use inmemory::InMemoryReminderRepo;
pub use job_scheduler::{FiredReminder, TokioJobScheduler};
