//! Typed client for the gateway's own status endpoints, used by the CLI.

#[allow(clippy::module_inception)]
mod client;
mod error;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

pub use client::ApiClient;
pub use error::ApiError;

/// A request against a fixed endpoint of a running gateway.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    /// Absolute path of the endpoint.
    const PATH: &'static str;

    fn build_request(self, url: Url, client: &Client) -> RequestBuilder
    where
        Self: Sized,
    {
        client.get(url)
    }
}
