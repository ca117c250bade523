use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Creation time of synthesized layers, zero value of Go's `time.Time`
pub const ZERO_CREATED: &str = "0001-01-01T00:00:00Z";

/// `json` in each layer directory of the legacy layout
///
/// Schema 2 manifests do not carry per-layer metadata,
/// so a layer gets this minimal one with empty container config.
///
/// ```
/// use image_transfer::local::LayerJson;
///
/// let json = serde_json::to_value(LayerJson::new("l2", Some("l1"))).unwrap();
/// assert_eq!(json["id"], "l2");
/// assert_eq!(json["parent"], "l1");
/// assert_eq!(json["created"], "0001-01-01T00:00:00Z");
/// assert_eq!(json["container_config"]["Env"], serde_json::Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerJson {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub created: String,
    pub container_config: ContainerConfig,
}

impl LayerJson {
    pub fn new(id: &str, parent: Option<&str>) -> Self {
        LayerJson {
            id: id.to_string(),
            parent: parent
                .filter(|parent| !parent.is_empty())
                .map(str::to_string),
            created: ZERO_CREATED.to_string(),
            container_config: ContainerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub hostname: String,
    pub domainname: String,
    pub user: String,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    pub env: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub image: String,
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,
    pub working_dir: String,
    pub entrypoint: Option<Vec<String>>,
    pub on_build: Option<Vec<String>>,
    pub labels: Option<BTreeMap<String, String>>,
}
