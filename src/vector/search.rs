//! Query execution against built indexes.
//!
//! - [`params`]: per-query overrides and time budgets
//! - [`result`]: ranked neighbors and completion status
//! - [`engine`]: the [`SearchEngine`](engine::SearchEngine) front end with
//!   atomic index publication

pub mod engine;
pub mod params;
pub mod result;
