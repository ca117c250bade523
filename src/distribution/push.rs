use crate::{
    config::Options,
    distribution::{
        client::{body_text, call},
        credentials, AuthSession, Client, Scope,
    },
    error::*,
    local::LocalImage,
    manifest, media_types, Digest, ImageName,
};
use oci_spec::image::{Descriptor, ImageManifest};
use std::{fs, io, path::Path};

/// Push the image saved in `dir` to the registry as `image`
///
/// Layers and config already in the registry are not uploaded again.
/// The manifest is pushed last, as schema 2 with the tag of `image`.
pub fn push(image: &ImageName, dir: &Path, options: &Options) -> Result<ImageManifest> {
    let client = Client::new(image.clone(), options.clone())?;
    let mut auth = AuthSession::discover(&client)?;
    auth.authorize(&client, Scope::PushPull, credentials(&client).as_ref())?;
    check_push_access(&client, &auth)?;

    let local = LocalImage::open(dir)?;
    let layers = local
        .layers
        .iter()
        .map(|layer| push_blob(&client, &auth, media_types::LAYER_TAR_GZIP, layer))
        .collect::<Result<Vec<_>>>()?;
    let config = push_blob(&client, &auth, media_types::IMAGE_CONFIG, &local.config)?;

    let manifest = manifest::manifest_v2(config, layers)?;
    client.push_manifest(&auth, &manifest)?;
    log::info!("Pushed {}", image);
    Ok(manifest)
}

/// Fail early if the token does not allow upload
///
/// Only `401 Unauthorized` is an error here.
/// The session opened by this request is left unused.
fn check_push_access(client: &Client, auth: &AuthSession) -> Result<()> {
    let url = client.v2_url("blobs/uploads/")?;
    let res = call(client.request("POST", &url, Some(auth))?)?;
    match res.status() {
        401 => Err(Error::UploadInitFailed {
            url: url.to_string(),
            status: 401,
            body: body_text(res),
        }),
        202 => Ok(()),
        status => {
            log::warn!("Unexpected status {} from {}", status, url);
            Ok(())
        }
    }
}

/// Upload a file as blob unless the registry already has it
fn push_blob(
    client: &Client,
    auth: &AuthSession,
    media_type: &str,
    path: &Path,
) -> Result<Descriptor> {
    let f = fs::File::open(path).map_err(|e| Error::local(path, e))?;
    let (digest, size) =
        Digest::from_reader_sha256(io::BufReader::new(f)).map_err(|e| Error::local(path, e))?;
    if client.blob_exists(auth, &digest)? {
        log::info!("{} already exists", digest);
    } else {
        client.upload_blob(auth, &digest, path)?;
    }
    manifest::descriptor(media_type, size, &digest)
}
