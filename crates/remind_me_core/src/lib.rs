pub mod domain;
pub mod events;
pub mod ports;
pub mod subscription;
pub mod usecases;
pub mod view_model;

pub use domain::{JobId, NewReminder, NotificationId, Reminder, ReminderHandle};
pub use events::{ListVisibility, ViewEvent, ViewEvents};
pub use ports::{JobRequestScheduler, PortError, PortResult, ReminderRepo, ReminderStream};
pub use subscription::{ReminderListReceiver, ReminderListSubscription};
pub use view_model::ReminderListViewModel;
