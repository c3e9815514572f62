//! # Content API Provider
//!
//! Implements [`RemoteDataSource`](core_library::RemoteDataSource) for the
//! band's self-hosted content API over any host [`HttpClient`](bridge_traits::HttpClient).
//!
//! - `GET /songs`, `GET /setlists?title=`, `GET /gigs`, `GET /gigs/{id}`
//! - `PUT /setlists/{id}/songs`, `PATCH /songs/{id}/lyrics`
//! - Bearer token authentication, never logged
//! - Retries with exponential backoff on 429 and 5xx for reads

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{ContentApiClient, ContentApiConfig};
pub use error::{ContentApiError, Result};
