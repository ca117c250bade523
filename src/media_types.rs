//! Media types of Docker image manifest schemas used by registries
//!
//! See [Image Manifest Version 2, Schema 2](https://distribution.github.io/distribution/spec/manifest-v2-2/)

use oci_spec::image::MediaType;

/// Schema 1 manifest with JWS signature
pub const MANIFEST_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Schema 1 manifest without signature
pub const MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Schema 2 manifest
pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Manifest list, a.k.a. "fat manifest"
pub const MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Container config JSON
pub const IMAGE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// Layer as a gzipped tar
pub const LAYER_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// OCI counterpart of [LAYER_TAR_GZIP]
pub const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Schema version of [MANIFEST_V2] and [MANIFEST_LIST]
pub const SCHEMA_VERSION: u32 = 2;

/// `Accept` header for manifest request, in preference order
pub fn manifest_accept() -> String {
    [MANIFEST_LIST, MANIFEST_V2, MANIFEST_V1_SIGNED, "application/json"].join(", ")
}

/// Whether the layer is stored as a `layer.tar` in the local layout
pub fn is_tar_gzip_layer(media_type: &MediaType) -> bool {
    match media_type {
        MediaType::ImageLayerGzip => true,
        MediaType::Other(ty) => ty == LAYER_TAR_GZIP,
        _ => false,
    }
}

/// Architecture selected from a manifest list
pub const TARGET_ARCH: &str = "amd64";

/// OS selected from a manifest list
pub const TARGET_OS: &str = "linux";
