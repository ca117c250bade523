use crate::error::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::{fmt, io};

/// Digest of contents
///
/// Digest is defined in [OCI image spec](https://github.com/opencontainers/image-spec/blob/v1.0.1/descriptor.md#digests)
/// as a string satisfies following EBNF:
///
/// ```text
/// digest                ::= algorithm ":" encoded
/// algorithm             ::= algorithm-component (algorithm-separator algorithm-component)*
/// algorithm-component   ::= [a-z0-9]+
/// algorithm-separator   ::= [+._-]
/// encoded               ::= [a-zA-Z0-9=_-]+
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    pub algorithm: String,
    pub encoded: String,
}

lazy_static::lazy_static! {
    static ref ALGORITHM_RE: Regex = Regex::new(r"^[a-z0-9]+([+._-][a-z0-9]+)*$").unwrap();
    static ref ENCODED_RE: Regex = Regex::new(r"^[a-zA-Z0-9=_-]+$").unwrap();
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Digest, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::new(&s).map_err(serde::de::Error::custom)
    }
}

impl Digest {
    pub fn new(input: &str) -> Result<Self> {
        let mut iter = input.split(':');
        match (iter.next(), iter.next(), iter.next()) {
            (Some(algorithm), Some(encoded), None)
                if ALGORITHM_RE.is_match(algorithm) && ENCODED_RE.is_match(encoded) =>
            {
                Ok(Digest {
                    algorithm: algorithm.to_string(),
                    encoded: encoded.to_string(),
                })
            }
            _ => Err(Error::InvalidDigest(input.to_string())),
        }
    }

    /// `sha256:<encoded>` from hex-encoded SHA-256 hash
    pub fn sha256(encoded: impl Into<String>) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            encoded: encoded.into(),
        }
    }

    /// Calc digest using SHA-256 algorithm
    pub fn from_buf_sha256(buf: &[u8]) -> Self {
        let mut hasher = DigestHasher::new();
        hasher.update(buf);
        hasher.finish()
    }

    /// Calc digest using SHA-256 algorithm while reading whole content
    pub fn from_reader_sha256(mut reader: impl io::Read) -> io::Result<(Self, u64)> {
        let mut hasher = DigestHasher::new();
        let size = io::copy(&mut reader, &mut hasher)?;
        Ok((hasher.finish(), size))
    }
}

/// Incremental SHA-256 digest calculation
///
/// ```
/// use image_transfer::{Digest, DigestHasher};
///
/// let mut hasher = DigestHasher::new();
/// hasher.update(b"hello ");
/// hasher.update(b"world");
/// assert_eq!(hasher.finish(), Digest::from_buf_sha256(b"hello world"));
/// ```
#[derive(Clone, Default)]
pub struct DigestHasher {
    hasher: Sha256,
}

impl DigestHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.hasher.update(buf);
    }

    /// Digest of all bytes given so far
    pub fn current(&self) -> Digest {
        self.clone().finish()
    }

    pub fn finish(self) -> Digest {
        let hash = self.hasher.finalize();
        Digest::sha256(base16ct::lower::encode_string(&hash))
    }
}

impl io::Write for DigestHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        let digest = Digest::new(
            "sha256:e692418e4cbaf90ca69d05a66403747baa33ee08806650b51fab815ad7fc331f",
        )?;
        assert_eq!(digest.algorithm, "sha256");
        assert_eq!(
            digest.encoded,
            "e692418e4cbaf90ca69d05a66403747baa33ee08806650b51fab815ad7fc331f"
        );

        assert!(Digest::new("e692418e4cbaf90ca69d05a66403747baa33ee08").is_err());
        assert!(Digest::new("sha256:abc:def").is_err());
        assert!(Digest::new("sha256:").is_err());
        assert!(Digest::new("SHA256:abc").is_err());
        Ok(())
    }

    #[test]
    fn empty_sha256() {
        // well-known hash of empty input
        assert_eq!(
            Digest::from_buf_sha256(b"").to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn reader() -> io::Result<()> {
        let buf = vec![7_u8; 10_000];
        let (digest, size) = Digest::from_reader_sha256(buf.as_slice())?;
        assert_eq!(size, 10_000);
        assert_eq!(digest, Digest::from_buf_sha256(&buf));
        Ok(())
    }

    #[test]
    fn serde() -> Result<()> {
        let digest: Digest = serde_json::from_str(r#""sha256:abcdef""#)?;
        assert_eq!(digest, Digest::sha256("abcdef"));
        assert_eq!(serde_json::to_string(&digest)?, r#""sha256:abcdef""#);
        assert!(serde_json::from_str::<Digest>(r#""abcdef""#).is_err());
        Ok(())
    }
}
