//! HTTP access to the budget change request backend.

pub mod api;
pub mod errors;
pub mod http;

pub use api::BcrApiClient;
pub use errors::ClientError;
pub use http::{HttpClient, HttpClientBuilder};
