//! Chunked blob upload
//!
//! ```text
//! POST  /v2/<name>/blobs/uploads/                  -> 202, Location: <session>
//! PATCH <session>           (every chunk but last) -> 202, Location: <next session>
//! PUT   <session>?digest=<digest>  (last chunk)    -> 201
//! ```
//!
//! A failed session is not resumed. Retry the whole [Client::upload_blob] instead.

use crate::{
    distribution::{
        client::{body_text, send},
        AuthSession, Client,
    },
    error::*,
    Digest, DigestHasher,
};
use std::{
    fs,
    io::{self, Read},
    path::Path,
};
use url::Url;

/// Size of chunks sent by `PATCH`, 2 MiB
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// A part of blob starting at `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub data: Vec<u8>,
    /// Whether this chunk ends at the end of the blob
    pub last: bool,
}

impl Chunk {
    /// Offset just after this chunk
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    /// Value of `Content-Range`, `<start>-<end>` with inclusive end
    pub fn range(&self) -> String {
        format!("{}-{}", self.start, self.end().saturating_sub(1).max(self.start))
    }
}

/// Split a blob of known `size` into [Chunk]s
///
/// Every chunk except the last one has `chunk_size` bytes.
/// Empty blob yields a single empty chunk marked as last.
pub struct Chunks<R> {
    reader: R,
    size: u64,
    offset: u64,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> Chunks<R> {
    pub fn new(reader: R, size: u64) -> Self {
        Self::with_chunk_size(reader, size, CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, size: u64, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Chunks {
            reader,
            size,
            offset: 0,
            chunk_size,
            done: false,
        }
    }

    fn read_chunk(&mut self) -> io::Result<Chunk> {
        let len = (self.size - self.offset).min(self.chunk_size as u64);
        let mut data = Vec::with_capacity(len as usize);
        (&mut self.reader).take(len).read_to_end(&mut data)?;
        if (data.len() as u64) < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "blob is shorter than expected, {} bytes at {}",
                    data.len(),
                    self.offset
                ),
            ));
        }
        let chunk = Chunk {
            start: self.offset,
            last: self.offset + len == self.size,
            data,
        };
        self.offset = chunk.end();
        Ok(chunk)
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let chunk = self.read_chunk();
        match &chunk {
            Ok(chunk) if !chunk.last => {}
            _ => self.done = true,
        }
        Some(chunk)
    }
}

/// An upload session on the registry
///
/// `location` is replaced by `Location` of every accepted `PATCH`,
/// and `hasher` sees exactly the bytes sent so far.
pub struct BlobTransferSession<'a> {
    client: &'a Client,
    auth: &'a AuthSession,
    location: Url,
    offset: u64,
    size: u64,
    hasher: DigestHasher,
}

impl<'a> BlobTransferSession<'a> {
    /// Start a new session by `POST /v2/<name>/blobs/uploads/`
    pub fn start(client: &'a Client, auth: &'a AuthSession, size: u64) -> Result<Self> {
        let location = client.prepare_upload(auth)?;
        Ok(BlobTransferSession {
            client,
            auth,
            location,
            offset: 0,
            size,
            hasher: DigestHasher::new(),
        })
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn request(&self, method: &str, chunk: &Chunk) -> Result<ureq::Request> {
        assert_eq!(chunk.start, self.offset, "chunks must be sent in order");
        Ok(self
            .client
            .request(method, &self.location, Some(self.auth))?
            .set("Content-Type", "application/octet-stream")
            .set("Content-Range", &chunk.range()))
    }

    /// Send an intermediate chunk by `PATCH`
    pub fn patch(&mut self, chunk: &Chunk) -> Result<()> {
        let res = send(self.request("PATCH", chunk)?, &chunk.data)?;
        match (res.status(), self.client.location(&res)) {
            (202, Some(next)) => {
                self.hasher.update(&chunk.data);
                self.offset = chunk.end();
                self.location = next;
                Ok(())
            }
            (status, _) => Err(Error::ChunkUploadFailed {
                url: self.location.to_string(),
                range: chunk.range(),
                status,
                body: body_text(res),
            }),
        }
    }

    /// Send the last chunk by `PUT` with the digest of the whole blob
    ///
    /// The digest is checked against `expected` before sending.
    pub fn finish(mut self, chunk: &Chunk, expected: Option<&Digest>) -> Result<Digest> {
        assert_eq!(chunk.end(), self.size, "last chunk must end at the blob size");
        self.hasher.update(&chunk.data);
        let digest = self.hasher.current();
        if let Some(expected) = expected {
            if expected != &digest {
                return Err(Error::DigestMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }
        let req = self
            .request("PUT", chunk)?
            .query("digest", &digest.to_string());
        let res = send(req, &chunk.data)?;
        if res.status() != 201 {
            return Err(Error::ChunkUploadFailed {
                url: self.location.to_string(),
                range: chunk.range(),
                status: res.status(),
                body: body_text(res),
            });
        }
        Ok(digest)
    }
}

impl Client {
    /// Upload the file at `path` as a blob of `digest`, in chunks of [CHUNK_SIZE]
    pub fn upload_blob(&self, auth: &AuthSession, digest: &Digest, path: &Path) -> Result<()> {
        let f = fs::File::open(path).map_err(|e| Error::local(path, e))?;
        let size = f.metadata().map_err(|e| Error::local(path, e))?.len();
        let mut session = BlobTransferSession::start(self, auth, size)?;
        for chunk in Chunks::new(io::BufReader::new(f), size) {
            let chunk = chunk.map_err(|e| Error::local(path, e))?;
            log::info!(
                "Pushing {} ... {:.2}%",
                digest,
                progress(chunk.end(), size)
            );
            if chunk.last {
                session.finish(&chunk, Some(digest))?;
                return Ok(());
            }
            session.patch(&chunk)?;
        }
        unreachable!("Chunks always ends with the last chunk")
    }
}

fn progress(sent: u64, size: u64) -> f64 {
    if size == 0 {
        100.0
    } else {
        sent as f64 / size as f64 * 100.0
    }
}
