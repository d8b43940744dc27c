pub mod extract;
pub mod handlers;
pub mod responses;
pub mod routes;

pub use extract::IdempotencyContext;
pub use routes::{create_router, AppState};
