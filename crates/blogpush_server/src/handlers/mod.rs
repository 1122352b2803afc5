pub mod api;
pub mod upload;

pub use api::{ApiState, api_routes};
