//! Remote database migration transport.
//!
//! Ships a schema migration to the calljmp control plane through a
//! two-step handshake: announce the content by ETag, upload the SQL
//! body to the returned URL when the server does not already hold it,
//! then commit and poll the asynchronous ingest job until completion.

mod client;
mod error;

pub use client::{RemoteClient, RemoteConfig, content_etag};
pub use error::{RemoteError, Result};
