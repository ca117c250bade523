use crate::{
    config::Options,
    distribution::AuthSession,
    error::*,
    manifest::Manifest,
    media_types, Digest, ImageName,
};
use oci_spec::image::ImageManifest;
use std::{fs, io, path::*};
use url::Url;

/// A client for `/v2/<namespace>/<name>/` API endpoint
///
/// This only holds where the image is and how to connect to it.
/// The bearer token lives in [AuthSession], and is passed to each call explicitly.
pub struct Client {
    agent: ureq::Agent,
    /// URL to registry server
    url: Url,
    image: ImageName,
    options: Options,
}

impl Client {
    pub fn new(image: ImageName, options: Options) -> Result<Self> {
        let url = image.registry_url(options.insecure)?;
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Client {
            agent: builder.build(),
            url,
            image,
            options,
        })
    }

    pub fn image(&self) -> &ImageName {
        &self.image
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// URL to registry root
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Create a request, with `Authorization: Bearer <token>` if the session has a token
    pub(crate) fn request(
        &self,
        method: &str,
        url: &Url,
        auth: Option<&AuthSession>,
    ) -> Result<ureq::Request> {
        let remaining = self.options.remaining()?;
        log::info!("{} {}", method, url);
        let mut req = self.agent.request_url(method, url);
        if let Some(remaining) = remaining {
            req = req.timeout(remaining);
        }
        if let Some(token) = auth.and_then(AuthSession::bearer) {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }
        Ok(req)
    }

    /// `/v2/<namespace>/<name>/<path>`
    pub(crate) fn v2_url(&self, path: &str) -> Result<Url> {
        Ok(self
            .url
            .join(&format!("/v2/{}/{}", self.image.repository(), path))?)
    }

    /// Resolve `Location` header, which may be relative to the registry
    pub(crate) fn location(&self, res: &ureq::Response) -> Option<Url> {
        let loc = res.header("Location")?;
        Url::parse(loc).or_else(|_| self.url.join(loc)).ok()
    }

    /// Get manifest of the image tag
    ///
    /// ```text
    /// GET /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// The schema of the returned manifest is decided by `Content-Type` of the response.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-manifests) for detail.
    pub fn get_manifest(&self, auth: &AuthSession) -> Result<Manifest> {
        let (content_type, body) =
            self.get_manifest_raw(auth, &self.image.tag, &media_types::manifest_accept())?;
        Manifest::from_slice(&content_type, &body)
    }

    /// Get schema 2 manifest by digest, used for the entry selected from a manifest list
    pub fn get_manifest_v2(&self, auth: &AuthSession, digest: &Digest) -> Result<ImageManifest> {
        let (_content_type, body) =
            self.get_manifest_raw(auth, &digest.to_string(), media_types::MANIFEST_V2)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn get_manifest_raw(
        &self,
        auth: &AuthSession,
        reference: &str,
        accept: &str,
    ) -> Result<(String, Vec<u8>)> {
        let url = self.v2_url(&format!("manifests/{}", reference))?;
        let res = call(self.request("GET", &url, Some(auth))?.set("Accept", accept))?;
        if res.status() != 200 {
            return Err(Error::ManifestFetchFailed {
                url: url.to_string(),
                status: res.status(),
                body: body_text(res),
            });
        }
        let content_type = res.header("Content-Type").unwrap_or_default().to_string();
        let mut body = Vec::new();
        io::Read::read_to_end(&mut res.into_reader(), &mut body)
            .map_err(|e| Error::ManifestFetchFailed {
                url: url.to_string(),
                status: 200,
                body: e.to_string(),
            })?;
        Ok((content_type, body))
    }

    /// Push manifest to registry
    ///
    /// ```text
    /// PUT /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// Manifest must be pushed after blobs are updated.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pushing-manifests) for detail.
    pub fn push_manifest(&self, auth: &AuthSession, manifest: &ImageManifest) -> Result<()> {
        let buf = serde_json::to_vec(manifest)?;
        let url = self.v2_url(&format!("manifests/{}", self.image.tag))?;
        let req = self
            .request("PUT", &url, Some(auth))?
            .set("Content-Type", media_types::MANIFEST_V2);
        let res = send(req, &buf)?;
        if res.status() != 201 {
            return Err(Error::ManifestUploadFailed {
                url: url.to_string(),
                status: res.status(),
                body: body_text(res),
            });
        }
        Ok(())
    }

    /// Download blob into `dest`
    ///
    /// ```text
    /// GET /v2/<name>/blobs/<digest>
    /// ```
    ///
    /// The body is streamed into `<dest>.part`, and renamed to `dest` when completed.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-blobs) for detail.
    pub fn fetch_blob(&self, auth: &AuthSession, digest: &Digest, dest: &Path) -> Result<()> {
        let url = self.v2_url(&format!("blobs/{}", digest))?;
        let res = call(self.request("GET", &url, Some(auth))?)?;
        if res.status() != 200 {
            return Err(Error::BlobFetchFailed {
                digest: digest.clone(),
                url: url.to_string(),
                status: res.status(),
                body: body_text(res),
            });
        }

        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);
        {
            let mut f = fs::File::create(&part).map_err(|e| Error::local(&part, e))?;
            io::copy(&mut res.into_reader(), &mut f).map_err(|e| Error::local(&part, e))?;
            f.sync_all().map_err(|e| Error::local(&part, e))?;
        }
        fs::rename(&part, dest).map_err(|e| Error::local(dest, e))?;
        Ok(())
    }

    /// Check if the blob already exists in the registry
    ///
    /// ```text
    /// HEAD /v2/<name>/blobs/<digest>/
    /// ```
    pub fn blob_exists(&self, auth: &AuthSession, digest: &Digest) -> Result<bool> {
        let url = self.v2_url(&format!("blobs/{}/", digest))?;
        let res = call(self.request("HEAD", &url, Some(auth))?)?;
        Ok(res.status() != 404)
    }

    /// Start blob upload session
    ///
    /// ```text
    /// POST /v2/<name>/blobs/uploads/
    /// ```
    ///
    /// Returns the URL of the session given by `Location`.
    pub fn prepare_upload(&self, auth: &AuthSession) -> Result<Url> {
        let url = self.v2_url("blobs/uploads/")?;
        let res = call(self.request("POST", &url, Some(auth))?)?;
        match (res.status(), self.location(&res)) {
            (202, Some(location)) => Ok(location),
            (status, _) => Err(Error::UploadInitFailed {
                url: url.to_string(),
                status,
                body: body_text(res),
            }),
        }
    }
}

/// Send request without body.
///
/// Unlike [ureq::Request::call], error status like 404 is returned as `Ok`
/// since the meaning of status depends on the API.
pub(crate) fn call(req: ureq::Request) -> Result<ureq::Response> {
    into_response(req.call())
}

/// Send request with body, see [call]
pub(crate) fn send(req: ureq::Request, body: &[u8]) -> Result<ureq::Response> {
    into_response(req.send_bytes(body))
}

fn into_response(
    res: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<ureq::Response> {
    match res {
        Ok(res) => Ok(res),
        Err(ureq::Error::Status(_status, res)) => Ok(res),
        Err(ureq::Error::Transport(e)) => Err(e.into()),
    }
}

/// Body of failed response for error message
pub(crate) fn body_text(res: ureq::Response) -> String {
    match res.into_string() {
        Ok(body) => describe_body(&body),
        Err(e) => format!("<unreadable body: {}>", e),
    }
}
