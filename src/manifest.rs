//! Manifests served by registries
//!
//! A registry answers a manifest request with one of three schemas,
//! and tells which one by `Content-Type`:
//!
//! - [ManifestV1] for [media_types::MANIFEST_V1_SIGNED] and [media_types::MANIFEST_V1]
//! - [ImageManifest] for [media_types::MANIFEST_V2]
//! - [ImageIndex] for [media_types::MANIFEST_LIST]
//!
//! Schema 2 and the manifest list share their layout with OCI image manifest and index,
//! so they are decoded into the types of [oci_spec::image].
//! Docker media types are kept as [MediaType::Other].

use crate::{error::*, layer_id, media_types, Digest};
use oci_spec::image::{
    Arch, Descriptor, DescriptorBuilder, ImageIndex, ImageManifest, ImageManifestBuilder,
    MediaType, Os,
};
use serde::{Deserialize, Serialize};

/// Manifest resolved from a registry response
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Legacy(ManifestV1),
    Distribution(ImageManifest),
    List(ImageIndex),
}

impl Manifest {
    /// Decode the body based on its `Content-Type` header
    pub fn from_slice(content_type: &str, body: &[u8]) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match essence {
            media_types::MANIFEST_V1_SIGNED | media_types::MANIFEST_V1 => {
                Ok(Manifest::Legacy(serde_json::from_slice(body)?))
            }
            media_types::MANIFEST_V2 => Ok(Manifest::Distribution(serde_json::from_slice(body)?)),
            media_types::MANIFEST_LIST => Ok(Manifest::List(serde_json::from_slice(body)?)),
            _ => Err(Error::UnsupportedManifestType(content_type.to_string())),
        }
    }
}

/// Descriptor of a blob, e.g. `config` and `layers` of a schema 2 manifest
pub fn descriptor(media_type: &str, size: u64, digest: &Digest) -> Result<Descriptor> {
    let size = i64::try_from(size)
        .map_err(|_| Error::InvalidManifest(format!("Blob {} is too large: {}", digest, size)))?;
    Ok(DescriptorBuilder::default()
        .media_type(media_type)
        .size(size)
        .digest(digest.to_string())
        .build()?)
}

/// Schema 2 manifest with [media_types::MANIFEST_V2] media type
pub fn manifest_v2(config: Descriptor, layers: Vec<Descriptor>) -> Result<ImageManifest> {
    Ok(ImageManifestBuilder::default()
        .schema_version(media_types::SCHEMA_VERSION)
        .media_type(media_types::MANIFEST_V2)
        .config(config)
        .layers(layers)
        .build()?)
}

/// Digest of the blob pointed by the descriptor
pub fn digest_of(descriptor: &Descriptor) -> Result<Digest> {
    Digest::new(descriptor.digest())
}

/// Find the manifest for `architecture` and `os` in a manifest list
pub fn select<'a>(list: &'a ImageIndex, architecture: &Arch, os: &Os) -> Result<&'a Descriptor> {
    list.manifests()
        .iter()
        .find(|entry| match entry.platform() {
            Some(platform) => platform.architecture() == architecture && platform.os() == os,
            None => false,
        })
        .ok_or_else(|| Error::NoMatchingPlatform {
            architecture: architecture.to_string(),
            os: os.to_string(),
        })
}

/// Find the manifest for [media_types::TARGET_ARCH] and [media_types::TARGET_OS]
pub fn select_target(list: &ImageIndex) -> Result<&Descriptor> {
    select(
        list,
        &Arch::from(media_types::TARGET_ARCH),
        &Os::from(media_types::TARGET_OS),
    )
}

/// Image manifest schema 1
///
/// `fsLayers` and `history` are paired by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV1 {
    pub schema_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<History>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: Digest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Legacy layer JSON embedded as a string
    pub v1_compatibility: String,
}

/// Layer listed in [ManifestV1]
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLayer<'a> {
    /// Layer ID stored in `v1Compatibility`
    pub id: String,
    pub parent: Option<String>,
    pub blob_sum: &'a Digest,
    /// Raw `v1Compatibility`, written as the `json` of the layer as is
    pub v1_compatibility: &'a str,
}

#[derive(Deserialize)]
struct V1Compatibility {
    id: String,
    #[serde(default)]
    parent: Option<String>,
}

impl ManifestV1 {
    /// Layers paired with their history entry
    pub fn layers(&self) -> Result<Vec<LegacyLayer<'_>>> {
        if self.fs_layers.is_empty() {
            return Err(Error::InvalidManifest("no fsLayers in manifest".to_string()));
        }
        if self.history.len() < self.fs_layers.len() {
            return Err(Error::InvalidManifest(format!(
                "{} fsLayers but only {} history entries",
                self.fs_layers.len(),
                self.history.len()
            )));
        }
        self.fs_layers
            .iter()
            .zip(&self.history)
            .map(|(layer, history)| {
                let compat: V1Compatibility = serde_json::from_str(&history.v1_compatibility)?;
                layer_id::validate(&compat.id)?;
                if let Some(parent) = &compat.parent {
                    layer_id::validate(parent)?;
                }
                Ok(LegacyLayer {
                    id: compat.id,
                    parent: compat.parent,
                    blob_sum: &layer.blob_sum,
                    v1_compatibility: &history.v1_compatibility,
                })
            })
            .collect()
    }
}
