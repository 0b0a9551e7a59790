pub mod protocol;
pub mod rest;
pub mod session;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::{
    create_reminder_handler, get_reminder_handler, list_reminders_handler, update_reminder_handler,
};
pub use ws_handler::ws_handler;
