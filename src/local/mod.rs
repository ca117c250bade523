//! Legacy image layout on local filesystem
//!
//! ```text
//! <root>/<registry>/<namespace>/<name>/
//! ├── <layer id>/
//! │   ├── VERSION
//! │   ├── json
//! │   └── layer.tar
//! ├── <config hash>.json
//! ├── manifest.json
//! └── repositories
//! ```
//!
//! This is the format `docker save` produced before OCI layouts,
//! and what `docker load` still accepts.

mod layer_json;

pub use layer_json::*;

use crate::{error::*, layer_id::LayerId, Digest, ImageName};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::*};

pub const PROJECT_NAME: &str = "image-transfer";

/// Content of `VERSION` in each layer directory
pub const LAYER_VERSION: &str = "1.0";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const REPOSITORIES_FILE: &str = "repositories";

/// `repositories` file, image name -> tag -> image ID
pub type Repositories = BTreeMap<String, BTreeMap<String, String>>;

/// Project root data directory, used when no directory is specified
pub fn data_dir() -> Result<PathBuf> {
    let p = ProjectDirs::from("", PROJECT_NAME, PROJECT_NAME).ok_or(Error::NoValidHomeDirectory)?;
    Ok(p.data_dir().to_owned())
}

/// An entry of `manifest.json`
///
/// `repoTags` is written in camel case like other pullers of this layout,
/// and `RepoTags` written by `docker save` is also accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalManifest {
    /// Path to image config relative to the image directory
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "repoTags", alias = "RepoTags", default)]
    pub repo_tags: Vec<String>,
    /// Paths to `layer.tar` relative to the image directory, from the base layer
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// A layer placed in the local layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecord {
    pub id: LayerId,
    /// `None` for the base layer
    pub parent: Option<LayerId>,
    pub digest: Digest,
    pub media_type: String,
    pub dir: PathBuf,
}

/// Writer of the image directory used while pulling
///
/// Every write is safe to repeat, so pulling into the same directory again
/// resumes or overwrites the previous result.
#[derive(Debug, Clone)]
pub struct LayoutWriter {
    dir: PathBuf,
}

impl LayoutWriter {
    /// Use `<root>/<registry>/<namespace>/<name>` for the image
    pub fn for_image(root: &Path, image: &ImageName) -> Result<Self> {
        Self::new(image.target_dir(root))
    }

    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| Error::local(&dir, e))?;
        Ok(LayoutWriter { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn layer_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// `<layer id>/layer.tar` relative to the image directory
    pub fn layer_tar_rel(id: &str) -> String {
        format!("{}/layer.tar", id)
    }

    pub fn layer_tar(&self, id: &str) -> PathBuf {
        self.layer_dir(id).join("layer.tar")
    }

    /// Create the layer directory with `VERSION` file
    pub fn create_layer_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.layer_dir(id);
        fs::create_dir_all(&dir).map_err(|e| Error::local(&dir, e))?;
        write(&dir.join("VERSION"), LAYER_VERSION.as_bytes())?;
        Ok(dir)
    }

    /// Write `json` of the layer as given, used for schema 1 manifest
    pub fn write_layer_json_raw(&self, id: &str, json: &str) -> Result<()> {
        write(&self.layer_dir(id).join("json"), json.as_bytes())
    }

    /// Write `json` of the layer from [LayerJson] unless it already exists
    pub fn write_layer_json(&self, id: &str, parent: Option<&str>) -> Result<()> {
        let path = self.layer_dir(id).join("json");
        if path.exists() {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(&LayerJson::new(id, parent))?;
        write(&path, &json)
    }

    /// Where the image config blob is downloaded, `<hash>.json`
    pub fn config_path(&self, digest: &Digest) -> PathBuf {
        self.dir.join(format!("{}.json", digest.encoded))
    }

    /// Merge the layer identity into the image config, and write it as `json` of the last layer
    ///
    /// `id` is set to `last`, and `parentId` to `parent` if it is not empty.
    /// Returns the path relative to the image directory.
    pub fn stamp_config(&self, config: &Path, last: &str, parent: &str) -> Result<String> {
        let buf = fs::read(config).map_err(|e| Error::local(config, e))?;
        let mut value: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&buf)?;
        value.insert("id".to_string(), last.into());
        if !parent.is_empty() {
            value.insert("parentId".to_string(), parent.into());
        }
        let rel = format!("{}/json", last);
        write(&self.dir.join(&rel), &serde_json::to_vec(&value)?)?;
        Ok(rel)
    }

    pub fn write_manifest(&self, manifest: &[LocalManifest]) -> Result<()> {
        write(
            &self.dir.join(MANIFEST_FILE),
            &serde_json::to_vec(manifest)?,
        )
    }

    pub fn write_repositories(&self, name: &str, tag: &str, image_id: &str) -> Result<()> {
        let mut repositories = Repositories::new();
        repositories
            .entry(name.to_string())
            .or_default()
            .insert(tag.to_string(), image_id.to_string());
        write(
            &self.dir.join(REPOSITORIES_FILE),
            &serde_json::to_vec_pretty(&repositories)?,
        )
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::local(path, e))
}

/// Image read from the local layout, used while pushing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub config: PathBuf,
    pub layers: Vec<PathBuf>,
    pub repo_tags: Vec<String>,
}

impl LocalImage {
    /// Read the first entry of `manifest.json` in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let buf = fs::read(&path).map_err(|e| Error::local(&path, e))?;
        let manifests: Vec<LocalManifest> = serde_json::from_slice(&buf)?;
        let manifest = manifests
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidLayout {
                path: path.clone(),
                reason: "No image found in manifest.json".to_string(),
            })?;
        Ok(LocalImage {
            config: inside(dir, &manifest.config)?,
            layers: manifest
                .layers
                .iter()
                .map(|layer| inside(dir, layer))
                .collect::<Result<_>>()?,
            repo_tags: manifest.repo_tags,
        })
    }
}

/// Join a path in `manifest.json` to the image directory
///
/// Only plain relative paths are allowed, i.e. no root, `.` or `..` component.
fn inside(dir: &Path, rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);
    let plain = path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if rel.is_empty() || !plain {
        return Err(Error::InvalidLayout {
            path: dir.join(MANIFEST_FILE),
            reason: format!("Path out of the image directory: {}", rel),
        });
    }
    Ok(dir.join(path))
}

/// Get images stored under `root`, i.e. directories having `repositories`
pub fn list_images(root: &Path) -> Result<Vec<(PathBuf, Repositories)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut images = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            Error::local(path, e.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || entry.file_name() != REPOSITORIES_FILE {
            continue;
        }
        let buf = fs::read(path).map_err(|e| Error::local(path, e))?;
        let repositories: Repositories = serde_json::from_slice(&buf)?;
        if let Some(dir) = path.parent() {
            images.push((dir.to_owned(), repositories));
        }
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn layer_dir() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let writer = LayoutWriter::new(tmp.path().join("image"))?;
        let dir = writer.create_layer_dir("abc")?;
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap(), "1.0");
        // Creating again is not an error
        writer.create_layer_dir("abc")?;
        assert_eq!(writer.layer_tar("abc"), dir.join("layer.tar"));
        assert_eq!(LayoutWriter::layer_tar_rel("abc"), "abc/layer.tar");
        Ok(())
    }

    #[test]
    fn layer_json_is_not_overwritten() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let writer = LayoutWriter::new(tmp.path().to_owned())?;
        writer.create_layer_dir("l1")?;
        writer.write_layer_json_raw("l1", r#"{"id":"l1","custom":true}"#)?;
        writer.write_layer_json("l1", None)?;
        let json = fs::read_to_string(writer.layer_dir("l1").join("json")).unwrap();
        assert_eq!(json, r#"{"id":"l1","custom":true}"#);
        Ok(())
    }

    #[test]
    fn stamp_config() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let writer = LayoutWriter::new(tmp.path().to_owned())?;
        let digest = Digest::sha256("cfg");
        let config = writer.config_path(&digest);
        assert_eq!(config, tmp.path().join("cfg.json"));
        fs::write(&config, r#"{"architecture":"amd64","os":"linux"}"#).unwrap();
        writer.create_layer_dir("l2")?;

        let rel = writer.stamp_config(&config, "l2", "l1")?;
        assert_eq!(rel, "l2/json");
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.path().join(&rel)).unwrap())?;
        assert_eq!(value["id"], "l2");
        assert_eq!(value["parentId"], "l1");
        assert_eq!(value["architecture"], "amd64");

        writer.stamp_config(&config, "l2", "")?;
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.path().join(&rel)).unwrap())?;
        assert!(value.get("parentId").is_none());
        Ok(())
    }

    #[test]
    fn manifest_round_trip() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let writer = LayoutWriter::new(tmp.path().to_owned())?;
        writer.write_manifest(&[LocalManifest {
            config: "l2/json".to_string(),
            repo_tags: vec!["alpine:3".to_string()],
            layers: vec!["l1/layer.tar".to_string(), "l2/layer.tar".to_string()],
        }])?;
        let image = LocalImage::open(tmp.path())?;
        assert_eq!(image.config, tmp.path().join("l2/json"));
        assert_eq!(
            image.layers,
            vec![
                tmp.path().join("l1/layer.tar"),
                tmp.path().join("l2/layer.tar")
            ]
        );
        assert_eq!(image.repo_tags, vec!["alpine:3".to_string()]);
        Ok(())
    }

    #[test]
    fn manifest_repo_tags_key() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let writer = LayoutWriter::new(tmp.path().to_owned())?;
        writer.write_manifest(&[LocalManifest {
            config: "a/json".to_string(),
            repo_tags: vec!["a:b".to_string()],
            layers: vec!["a/layer.tar".to_string()],
        }])?;
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.path().join(MANIFEST_FILE)).unwrap())?;
        assert_eq!(value[0]["repoTags"], serde_json::json!(["a:b"]));
        assert!(value[0].get("RepoTags").is_none());
        assert_eq!(value[0]["Config"], "a/json");
        assert_eq!(value[0]["Layers"], serde_json::json!(["a/layer.tar"]));

        // as written by `docker save`
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"[{"Config":"a/json","RepoTags":["c:d"],"Layers":["a/layer.tar"]}]"#,
        )
        .unwrap();
        let image = LocalImage::open(tmp.path())?;
        assert_eq!(image.repo_tags, vec!["c:d".to_string()]);
        Ok(())
    }

    #[test]
    fn manifest_paths_out_of_image() {
        let tmp = tempfile::tempdir().unwrap();
        for (config, layer) in [
            ("../secret.json", "a/layer.tar"),
            ("/etc/passwd", "a/layer.tar"),
            ("a/json", "../../other/layer.tar"),
            ("a/json", "a/../../layer.tar"),
            ("a/json", ""),
        ] {
            let manifest = serde_json::json!([{
                "Config": config,
                "repoTags": [],
                "Layers": [layer],
            }]);
            fs::write(tmp.path().join(MANIFEST_FILE), manifest.to_string()).unwrap();
            assert!(
                matches!(
                    LocalImage::open(tmp.path()),
                    Err(Error::InvalidLayout { .. })
                ),
                "{} and {} must be rejected",
                config,
                layer
            );
        }
    }

    #[test]
    fn empty_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "[]").unwrap();
        assert!(matches!(
            LocalImage::open(tmp.path()),
            Err(Error::InvalidLayout { .. })
        ));
        assert!(matches!(
            LocalImage::open(&tmp.path().join("missing")),
            Err(Error::LocalLayoutIo { .. })
        ));
    }

    #[test]
    fn repositories_and_list() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let image = ImageName::parse("localhost:5000/test/repo:tag1")?;
        let writer = LayoutWriter::for_image(tmp.path(), &image)?;
        writer.write_repositories(&image.name, &image.tag, "l2")?;

        let images = list_images(tmp.path())?;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, image.target_dir(tmp.path()));
        assert_eq!(
            images[0].1,
            btreemap! {
                "repo".to_string() => btreemap! { "tag1".to_string() => "l2".to_string() }
            }
        );
        assert!(list_images(&tmp.path().join("none"))?.is_empty());
        Ok(())
    }
}
