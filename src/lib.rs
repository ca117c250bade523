//! image-transfer
//! ===============
//!
//! Pull container images from a registry into the legacy `docker save` layout,
//! and push them back.
//!
//! ```no_run
//! use image_transfer::{config::Options, distribution, ImageName};
//! use std::path::Path;
//!
//! let image = ImageName::parse("library/alpine:3.18")?;
//! let pulled = distribution::pull(&image, Path::new("/tmp/images"), &Options::default())?;
//! println!("{} in {}", pulled.image_id, pulled.dir.display());
//!
//! let target = ImageName::parse("localhost:5000/test/alpine:3.18")?;
//! distribution::push(&target, &pulled.dir, &Options::default().insecure(true))?;
//! # Ok::<(), image_transfer::error::Error>(())
//! ```

pub mod config;
pub mod distribution;
pub mod error;
pub mod layer_id;
pub mod local;
pub mod manifest;
pub mod media_types;

mod digest;
mod image_name;

pub use digest::{Digest, DigestHasher};
pub use image_name::{ImageName, DEFAULT_NAMESPACE, DEFAULT_REGISTRY, DEFAULT_TAG};
