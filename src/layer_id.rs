//! Layer IDs of the legacy (pre content-addressable) image store
//!
//! A layer ID is chained from the ID of its parent and the digest of its blob,
//! so the same sequence of blobs always yields the same sequence of IDs.

use crate::{error::*, Digest};
use std::path::{Component, Path};

/// ID of a layer directory in the local layout, a hex-encoded SHA-256 hash
pub type LayerId = String;

/// `sha256("<parent>\\n<digest>\\n")` in hex, where `parent` is empty for the first layer
///
/// The separator is the two characters `\` and `n`, not a line feed.
/// IDs in existing layouts are computed this way, so it must not be changed.
pub fn derive(parent: &str, digest: &Digest) -> LayerId {
    Digest::from_buf_sha256(format!("{}\\n{}\\n", parent, digest).as_bytes()).encoded
}

/// Check that a layer ID given by a registry names a single directory
///
/// IDs of schema 1 manifests are used as directory names as is,
/// and must not point outside of the image directory.
pub fn validate(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == id => Ok(()),
        _ => Err(Error::InvalidManifest(format!("Invalid layer ID: {:?}", id))),
    }
}

/// Derive IDs of all layers from the outermost one
pub fn chain<'a>(digests: impl IntoIterator<Item = &'a Digest>) -> Vec<LayerId> {
    let mut parent = String::new();
    digests
        .into_iter()
        .map(|digest| {
            let id = derive(&parent, digest);
            parent = id.clone();
            id
        })
        .collect()
}
