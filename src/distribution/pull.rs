use crate::{
    config::Options,
    distribution::{credentials, AuthSession, Client, Scope},
    error::*,
    layer_id::{self, LayerId},
    local::{LayerRecord, LayoutWriter, LocalManifest},
    manifest::{self, Manifest, ManifestV1},
    media_types, Digest, ImageName,
};
use oci_spec::image::ImageManifest;
use std::path::*;

/// Where the blobs written into the local layout come from
pub trait BlobSource {
    /// Write the blob of `digest` into `dest`
    fn fetch_blob(&self, digest: &Digest, dest: &Path) -> Result<()>;
}

/// Blobs in the registry, fetched with the token of the session
pub struct Remote<'a> {
    pub client: &'a Client,
    pub auth: &'a AuthSession,
}

impl BlobSource for Remote<'_> {
    fn fetch_blob(&self, digest: &Digest, dest: &Path) -> Result<()> {
        self.client.fetch_blob(self.auth, digest, dest)
    }
}

/// Result of [pull]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pulled {
    /// Image directory, `<root>/<registry>/<namespace>/<name>`
    pub dir: PathBuf,
    /// ID recorded in `repositories`
    pub image_id: String,
    pub layers: Vec<LayerRecord>,
}

/// Get image from registry and save it under `root` in the legacy layout
pub fn pull(image: &ImageName, root: &Path, options: &Options) -> Result<Pulled> {
    let client = Client::new(image.clone(), options.clone())?;
    let mut auth = AuthSession::discover(&client)?;
    auth.authorize(&client, Scope::Pull, credentials(&client).as_ref())?;

    let manifest = client.get_manifest(&auth)?;
    let writer = LayoutWriter::for_image(root, image)?;
    let remote = Remote {
        client: &client,
        auth: &auth,
    };
    let (image_id, layers) = match manifest {
        Manifest::Legacy(manifest) => translate_v1(&remote, &writer, &manifest)?,
        Manifest::Distribution(manifest) => translate_v2(&remote, &writer, &manifest, image)?,
        Manifest::List(list) => {
            let entry = manifest::select_target(&list)?;
            log::info!(
                "Use {} for {}/{}",
                entry.digest(),
                media_types::TARGET_OS,
                media_types::TARGET_ARCH
            );
            let manifest = client.get_manifest_v2(&auth, &manifest::digest_of(entry)?)?;
            translate_v2(&remote, &writer, &manifest, image)?
        }
    };
    writer.write_repositories(&image.name, &image.tag, &image_id)?;
    Ok(Pulled {
        dir: writer.dir().to_owned(),
        image_id,
        layers,
    })
}

fn fetch_unless_exists(source: &impl BlobSource, digest: &Digest, dest: &Path) -> Result<()> {
    if dest.exists() {
        log::info!("{} already exists, skip downloading {}", dest.display(), digest);
        Ok(())
    } else {
        source.fetch_blob(digest, dest)
    }
}

/// Write layers of a schema 1 manifest
///
/// Layer IDs and `json` come from `v1Compatibility` as is,
/// once every ID is checked to be a plain directory name by [layer_id::validate].
/// The image ID is the ID of the last layer processed.
pub fn translate_v1(
    source: &impl BlobSource,
    writer: &LayoutWriter,
    manifest: &ManifestV1,
) -> Result<(String, Vec<LayerRecord>)> {
    let layers = manifest.layers()?;
    let mut image_id = layers[0].id.clone();
    let mut records = Vec::new();
    for layer in layers {
        let dir = writer.create_layer_dir(&layer.id)?;
        writer.write_layer_json_raw(&layer.id, layer.v1_compatibility)?;
        fetch_unless_exists(source, layer.blob_sum, &writer.layer_tar(&layer.id))?;
        image_id = layer.id.clone();
        records.push(LayerRecord {
            id: layer.id,
            parent: layer.parent,
            digest: layer.blob_sum.clone(),
            media_type: media_types::LAYER_TAR_GZIP.to_string(),
            dir,
        });
    }
    Ok((image_id, records))
}

/// Write layers and config of a schema 2 manifest
///
/// Each layer gets an ID chained from its parent (see [layer_id::derive]).
/// The image config is stored as `json` of the last layer,
/// with `id` of the last layer and `parentId` of the layer before it.
/// Returns the ID of the last layer as the image ID.
pub fn translate_v2(
    source: &impl BlobSource,
    writer: &LayoutWriter,
    manifest: &ImageManifest,
    image: &ImageName,
) -> Result<(String, Vec<LayerRecord>)> {
    if manifest.layers().is_empty() {
        return Err(Error::InvalidManifest("no layers in manifest".to_string()));
    }

    let mut tars = Vec::new();
    let mut records = Vec::new();
    let mut parent: LayerId = String::new();
    let mut origin_parent: LayerId = String::new();
    for layer in manifest.layers() {
        let digest = manifest::digest_of(layer)?;
        let id = layer_id::derive(&parent, &digest);
        let dir = writer.create_layer_dir(&id)?;
        writer.write_layer_json(&id, Some(parent.as_str()))?;
        if media_types::is_tar_gzip_layer(layer.media_type()) {
            fetch_unless_exists(source, &digest, &writer.layer_tar(&id))?;
            tars.push(LayoutWriter::layer_tar_rel(&id));
        } else {
            log::debug!("No layer.tar for {} ({})", digest, layer.media_type());
        }
        records.push(LayerRecord {
            id: id.clone(),
            parent: Some(parent.clone()).filter(|p| !p.is_empty()),
            digest,
            media_type: layer.media_type().to_string(),
            dir,
        });
        origin_parent = std::mem::replace(&mut parent, id);
    }
    let last = parent;

    let config_digest = manifest::digest_of(manifest.config())?;
    let config = writer.config_path(&config_digest);
    fetch_unless_exists(source, &config_digest, &config)?;
    let config = writer.stamp_config(&config, &last, &origin_parent)?;
    writer.write_manifest(&[LocalManifest {
        config,
        repo_tags: vec![image.repo_tag()],
        layers: tars,
    }])?;
    Ok((last, records))
}
