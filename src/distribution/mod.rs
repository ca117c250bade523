//! Pull and push images through [Docker registry HTTP API V2](https://docs.docker.com/registry/spec/api/)
//!
//! ```text
//! GET  /v2/                          -> discover auth challenge
//! GET  <realm>?service=..&scope=..   -> bearer token
//! GET  /v2/<name>/manifests/<tag>    -> schema 1, schema 2 or manifest list
//! GET  /v2/<name>/blobs/<digest>     -> layer and config blobs
//! HEAD /v2/<name>/blobs/<digest>/    -> existence check before upload
//! POST /v2/<name>/blobs/uploads/     -> chunked upload, see [upload]
//! PUT  /v2/<name>/manifests/<tag>    -> schema 2 manifest
//! ```

mod auth;
mod client;
mod pull;
mod push;
pub mod upload;

pub use auth::*;
pub use client::Client;
pub use pull::*;
pub use push::*;

use crate::config::Credentials;

/// Credentials for the registry of the client
///
/// Explicit ones in [crate::config::Options] are preferred to the stored ones.
/// A broken auth file is reported and ignored, then the registry is accessed anonymously.
fn credentials(client: &Client) -> Option<Credentials> {
    if let Some(credentials) = &client.options().credentials {
        return Some(credentials.clone());
    }
    match StoredAuth::load_all() {
        Ok(stored) => stored.get(&client.image().registry),
        Err(e) => {
            log::warn!("Failed to load stored credentials: {}", e);
            None
        }
    }
}
