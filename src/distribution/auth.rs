use crate::{
    config::Credentials,
    distribution::client::{body_text, call, Client},
    error::*,
    image_name::DEFAULT_REGISTRY,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, fs, io, path::*};
use url::Url;

/// Operation on the repository requested to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Pull,
    PushPull,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Pull => write!(f, "pull"),
            Scope::PushPull => write!(f, "push,pull"),
        }
    }
}

impl Scope {
    /// `repository:<namespace>/<name>:<operation>`
    pub fn for_repository(&self, repository: &str) -> String {
        format!("repository:{}:{}", repository, self)
    }
}

/// WWW-Authenticate challenge returned from `/v2/`
///
/// ```
/// use image_transfer::distribution::AuthChallenge;
///
/// let auth = AuthChallenge::from_header(
///   r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#,
/// ).unwrap();
///
/// assert_eq!(auth, AuthChallenge {
///   realm: "https://auth.docker.io/token".to_string(),
///   service: "registry.docker.io".to_string(),
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
}

lazy_static::lazy_static! {
    static ref QUOTED_RE: Regex = Regex::new(r#""(.*?)""#).unwrap();
}

impl AuthChallenge {
    /// Take the realm and service from quoted values in the header.
    ///
    /// Exactly two quoted values are expected, the first one is the realm.
    pub fn from_header(header: &str) -> Result<Self> {
        let quoted: Vec<&str> = QUOTED_RE
            .captures_iter(header)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
            .collect();
        match quoted[..] {
            [realm, service] => Ok(AuthChallenge {
                realm: realm.to_string(),
                service: service.to_string(),
            }),
            _ => Err(Error::AuthDiscoveryFailed {
                url: String::new(),
                reason: format!("get realm and service from header {} failed", header),
            }),
        }
    }
}

/// Authentication state of a single pull or push
///
/// A registry without challenge is treated as anonymous,
/// and no `Authorization` header is sent.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    challenge: Option<AuthChallenge>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Token {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl AuthSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_challenge(challenge: AuthChallenge) -> Self {
        AuthSession {
            challenge: Some(challenge),
            token: None,
        }
    }

    /// Request API root `/v2/` without authorization, and read `Www-Authenticate` header
    pub fn discover(client: &Client) -> Result<Self> {
        let url = client.url().join("/v2/")?;
        let res = call(client.request("GET", &url, None)?).map_err(|e| match e {
            Error::NetworkError(e) => Error::AuthDiscoveryFailed {
                url: url.to_string(),
                reason: e.to_string(),
            },
            e => e,
        })?;
        match res.header("Www-Authenticate") {
            Some(header) => {
                let challenge = AuthChallenge::from_header(header).map_err(|e| match e {
                    Error::AuthDiscoveryFailed { reason, .. } => Error::AuthDiscoveryFailed {
                        url: url.to_string(),
                        reason,
                    },
                    e => e,
                })?;
                log::debug!("Auth challenge from {}: {:?}", url, challenge);
                Ok(Self::with_challenge(challenge))
            }
            None => {
                log::debug!("No auth challenge from {}, access anonymously", url);
                Ok(Self::anonymous())
            }
        }
    }

    pub fn challenge(&self) -> Option<&AuthChallenge> {
        self.challenge.as_ref()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Get a token for `scope` from the realm. No-op for an anonymous registry.
    pub fn authorize(
        &mut self,
        client: &Client,
        scope: Scope,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let challenge = match &self.challenge {
            Some(challenge) if !challenge.realm.is_empty() => challenge,
            _ => return Ok(()),
        };
        let fail = |reason: String| Error::AuthExchangeFailed {
            url: challenge.realm.clone(),
            reason,
        };

        let realm = Url::parse(&challenge.realm).map_err(|e| fail(e.to_string()))?;
        let mut req = client
            .request("GET", &realm, None)?
            .set("Accept", "application/json")
            .query("service", &challenge.service)
            .query("scope", &scope.for_repository(&client.image().repository()));
        if let Some(credentials) = credentials {
            let octet = STANDARD.encode(format!(
                "{}:{}",
                credentials.username, credentials.password
            ));
            req = req
                .query("account", &credentials.username)
                .set("Authorization", &format!("Basic {}", octet));
        }
        let res = call(req).map_err(|e| fail(e.to_string()))?;
        if res.status() != 200 {
            let status = res.status();
            return Err(fail(format!("code: {}, body: {}", status, body_text(res))));
        }
        let token: Token = res.into_json().map_err(|e| fail(e.to_string()))?;
        let token = token
            .token
            .or(token.access_token)
            .ok_or_else(|| fail("No token in response".to_string()))?;
        log::debug!("Authorized for {} on {}", scope, client.image().repository());
        self.token = Some(token);
        Ok(())
    }
}

/// Authentication info stored in filesystem
///
/// This reads the `auths` section of docker's `config.json`
/// where `auth` is base64 encoded `<username>:<password>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredAuth {
    #[serde(default)]
    auths: HashMap<String, Auth>,
}

impl StoredAuth {
    /// Load authentication info stored by this crate
    pub fn load() -> Result<Self> {
        let mut auth = StoredAuth::default();
        if let Some(path) = auth_path() {
            let new = Self::from_path(&path)?;
            auth.append(new);
        }
        Ok(auth)
    }

    /// Load authentication info with docker and podman setting
    pub fn load_all() -> Result<Self> {
        let mut auth = StoredAuth::default();
        if let Some(path) = docker_auth_path() {
            if let Ok(new) = Self::from_path(&path) {
                auth.append(new);
            }
        }
        if let Some(path) = podman_auth_path() {
            if let Ok(new) = Self::from_path(&path) {
                auth.append(new);
            }
        }
        if let Some(path) = auth_path() {
            let new = Self::from_path(&path)?;
            auth.append(new);
        }
        Ok(auth)
    }

    pub fn insert(&mut self, registry: &str, credentials: &Credentials) {
        let octet = STANDARD.encode(format!(
            "{}:{}",
            credentials.username, credentials.password
        ));
        self.auths
            .insert(registry.to_string(), Auth { auth: octet });
    }

    /// Credentials for the registry host
    pub fn get(&self, registry: &str) -> Option<Credentials> {
        let keys: &[&str] = if registry == DEFAULT_REGISTRY {
            &[
                DEFAULT_REGISTRY,
                "https://index.docker.io/v1/",
                "index.docker.io",
                "docker.io",
            ]
        } else {
            &[registry]
        };
        keys.iter()
            .filter_map(|key| self.auths.get(*key))
            .find_map(Auth::decode)
    }

    pub fn save(&self) -> Result<()> {
        let path = auth_path().ok_or(Error::NoValidRuntimeDirectory)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::local(parent, e))?;
        }
        let f = fs::File::create(&path).map_err(|e| Error::local(&path, e))?;
        serde_json::to_writer_pretty(f, self)?;
        Ok(())
    }

    pub fn append(&mut self, other: Self) {
        for (key, value) in other.auths.into_iter() {
            self.auths.insert(key, value);
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        if path.is_file() {
            let f = fs::File::open(path).map_err(|e| Error::local(path, e))?;
            Ok(serde_json::from_reader(io::BufReader::new(f))?)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Auth {
    #[serde(default)]
    auth: String,
}

impl Auth {
    fn decode(&self) -> Option<Credentials> {
        let decoded = STANDARD.decode(&self.auth).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credentials::new(username, password))
    }
}

fn auth_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", crate::local::PROJECT_NAME)
        .and_then(|dirs| Some(dirs.runtime_dir()?.join("auth.json")))
        .or_else(|| {
            // Most of container does not set XDG_RUNTIME_DIR,
            // and then this fallback to `~/.image-transfer/config.json` like docker.
            let dirs = directories::BaseDirs::new()?;
            Some(
                dirs.home_dir()
                    .join(format!(".{}/config.json", crate::local::PROJECT_NAME)),
            )
        })
}

fn docker_auth_path() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    Some(dirs.home_dir().join(".docker/config.json"))
}

fn podman_auth_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "containers")?;
    Some(dirs.runtime_dir()?.join("auth.json"))
}
