use crate::error::*;
use std::{fmt, path::*};
use url::Url;

/// Registry used when the image name does not contain one
pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

/// Namespace used for single-segment names, e.g. `alpine`
pub const DEFAULT_NAMESPACE: &str = "library";

pub const DEFAULT_TAG: &str = "latest";

/// Prefix rewrites applied before parsing
const ALIASES: &[(&str, &str)] = &[
    ("docker.io", "registry-1.docker.io"),
    ("k8s.gcr.io", "gcr.io/google-containers"),
];

/// Image name in `[registry/][namespace/]name[:tag]` form
///
/// ```
/// use image_transfer::ImageName;
///
/// let name = ImageName::parse("quay.io/coreos/etcd:v3.5.0").unwrap();
/// assert_eq!(name.registry, "quay.io");
/// assert_eq!(name.namespace, "coreos");
/// assert_eq!(name.name, "etcd");
/// assert_eq!(name.tag, "v3.5.0");
///
/// let name = ImageName::parse("alpine").unwrap();
/// assert_eq!(name.registry, "registry-1.docker.io");
/// assert_eq!(name.namespace, "library");
/// assert_eq!(name.tag, "latest");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    /// Host of registry, may contain a port
    pub registry: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.name, self.tag
        )
    }
}

impl ImageName {
    /// Parse `[registry/][namespace/]name[:tag]` into its four parts
    ///
    /// Missing parts are filled by [DEFAULT_REGISTRY], [DEFAULT_NAMESPACE] and [DEFAULT_TAG].
    /// A part written but left empty is rejected rather than defaulted,
    /// e.g. `alpine:` with an empty tag, or `/alpine` with an empty namespace.
    pub fn parse(input: &str) -> Result<Self> {
        let input = normalize(input);
        let err = || Error::InvalidReference(input.clone());

        let segments: Vec<&str> = input.split('/').collect();
        let (registry, namespace, last) = match segments[..] {
            [last] => (DEFAULT_REGISTRY, DEFAULT_NAMESPACE, last),
            [namespace, last] => (DEFAULT_REGISTRY, namespace, last),
            [registry, namespace, last] => (registry, namespace, last),
            _ => return Err(err()),
        };
        let (name, tag) = split_tag(last).ok_or_else(err)?;
        if registry.is_empty() || namespace.is_empty() || name.is_empty() || tag.is_empty() {
            return Err(err());
        }
        Ok(ImageName {
            registry: registry.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// `<namespace>/<name>` used in `/v2/<repository>/...` API
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// `<name>:<tag>` recorded in `repoTags` of the local layout
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// URL to the registry root
    pub fn registry_url(&self, insecure: bool) -> Result<Url> {
        let scheme = if insecure { "http" } else { "https" };
        Ok(Url::parse(&format!("{}://{}/", scheme, self.registry))?)
    }

    /// Directory where the image is stored under `root`, i.e.
    /// `<root>/<registry>/<namespace>/<name>`
    pub fn target_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.registry)
            .join(&self.namespace)
            .join(&self.name)
    }
}

fn normalize(input: &str) -> String {
    for (alias, replaced) in ALIASES {
        if let Some(rest) = input.strip_prefix(alias) {
            if rest.is_empty() || rest.starts_with('/') {
                return format!("{}{}", replaced, rest);
            }
        }
    }
    input.to_string()
}

fn split_tag(last: &str) -> Option<(&str, &str)> {
    let mut iter = last.split(':');
    match (iter.next(), iter.next(), iter.next()) {
        (Some(name), None, None) => Some((name, DEFAULT_TAG)),
        (Some(name), Some(tag), None) => Some((name, tag)),
        _ => None,
    }
}
