pub mod auth;
pub mod error;
pub mod forms;
pub mod likes;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod users;
mod views;

pub use auth::{AppState, AppStateInner};
pub use routes::router;
