mod handlers;
mod routes;
mod types;

pub use routes::{create_router, AppState};
pub use types::{ApiError, GetMetricRequest, StatusResponse};

#[cfg(test)]
mod tests;
