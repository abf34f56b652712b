//! Startup configuration – reads `~/.segbridge/config.toml`.
//!
//! Loaded once before the node starts; nothing is reloaded at runtime.

use std::fs;
use std::path::{Path, PathBuf};

use segbridge_middleware::{Eviction, QueuePolicy, RosbridgeConfig};
use segbridge_node::{ExtractorConfig, NodeConfig};
use segbridge_types::{BridgeError, SegmentType};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Node parameters as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Node name; relative topics resolve under `/<node_name>/`.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Segment to extract, either the integer tag or its name (`"torso"`).
    #[serde(default, deserialize_with = "deserialize_segment")]
    pub default_segment: SegmentType,

    #[serde(default = "default_input_topic")]
    pub input_topic: String,

    #[serde(default = "default_output_topic")]
    pub output_topic: String,

    #[serde(default = "default_queue_size")]
    pub input_queue_size: usize,

    #[serde(default = "default_queue_size")]
    pub output_queue_size: usize,

    /// What a full queue discards.
    #[serde(default)]
    pub eviction: Eviction,

    /// WebSocket URL of the `rosbridge_server`.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,
}

fn default_node_name() -> String {
    segbridge_node::node::NODE_NAME.to_string()
}
fn default_input_topic() -> String {
    segbridge_node::node::HUMANS_SUB_TOPIC.to_string()
}
fn default_output_topic() -> String {
    segbridge_node::node::HUMANS_PUB_TOPIC.to_string()
}
fn default_queue_size() -> usize {
    segbridge_middleware::bus::DEFAULT_QUEUE_DEPTH
}
fn default_rosbridge_url() -> String {
    segbridge_middleware::rosbridge::DEFAULT_ROSBRIDGE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            default_segment: SegmentType::default(),
            input_topic: default_input_topic(),
            output_topic: default_output_topic(),
            input_queue_size: default_queue_size(),
            output_queue_size: default_queue_size(),
            eviction: Eviction::default(),
            rosbridge_url: default_rosbridge_url(),
        }
    }
}

fn deserialize_segment<'de, D>(deserializer: D) -> Result<SegmentType, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Tag(i64),
        Name(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Tag(tag) => i8::try_from(tag)
            .map(SegmentType)
            .map_err(|_| serde::de::Error::custom(format!("segment tag {tag} out of range"))),
        Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.node_name.trim_matches('/').is_empty() {
            return Err(BridgeError::Config("node_name must not be empty".to_string()));
        }
        for (key, topic) in [("input_topic", &self.input_topic), ("output_topic", &self.output_topic)] {
            let relative = topic.trim_start_matches("~/").trim_start_matches('~');
            if relative.trim_matches('/').is_empty() {
                return Err(BridgeError::Config(format!("{key} must not be empty")));
            }
        }
        for (key, size) in [
            ("input_queue_size", self.input_queue_size),
            ("output_queue_size", self.output_queue_size),
        ] {
            if size == 0 {
                return Err(BridgeError::Config(format!("{key} must be at least 1")));
            }
        }
        if !(self.rosbridge_url.starts_with("ws://") || self.rosbridge_url.starts_with("wss://")) {
            return Err(BridgeError::Config(format!(
                "rosbridge_url must be a ws:// or wss:// URL, got '{}'",
                self.rosbridge_url
            )));
        }
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            node_name: self.node_name.clone(),
            input_topic: self.input_topic.clone(),
            output_topic: self.output_topic.clone(),
            input_queue: QueuePolicy::new(self.input_queue_size, self.eviction),
            output_queue: QueuePolicy::new(self.output_queue_size, self.eviction),
            extractor: ExtractorConfig {
                target_segment_type: self.default_segment,
            },
        }
    }

    /// Transport wiring matching the resolved topics of `node`.
    pub fn rosbridge_config(&self, node: &NodeConfig) -> RosbridgeConfig {
        RosbridgeConfig {
            url: self.rosbridge_url.clone(),
            input_topic: node.resolved_input_topic(),
            output_topic: node.resolved_output_topic(),
            input_queue: node.input_queue,
            output_queue: node.output_queue,
        }
    }
}

/// Return the path to `~/.segbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".segbridge").join("config.toml")
}

/// Load the config from `explicit` (must exist) or the default location
/// (defaults when absent), then apply env overrides.
pub fn load(explicit: Option<&Path>) -> Result<Config, BridgeError> {
    let mut cfg = match explicit {
        Some(path) => load_from(path)?.ok_or_else(|| {
            BridgeError::Config(format!("config file {} does not exist", path.display()))
        })?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `SEGBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SEGBRIDGE_DEFAULT_SEGMENT` | `default_segment` |
/// | `SEGBRIDGE_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `SEGBRIDGE_INPUT_TOPIC` | `input_topic` |
/// | `SEGBRIDGE_OUTPUT_TOPIC` | `output_topic` |
/// | `SEGBRIDGE_QUEUE_SIZE` | `input_queue_size` and `output_queue_size` |
///
/// Unparsable values are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SEGBRIDGE_DEFAULT_SEGMENT") {
        match v.parse::<SegmentType>() {
            Ok(segment) => cfg.default_segment = segment,
            Err(e) => warn!(value = %v, error = %e, "ignoring SEGBRIDGE_DEFAULT_SEGMENT"),
        }
    }
    if let Ok(v) = std::env::var("SEGBRIDGE_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Ok(v) = std::env::var("SEGBRIDGE_INPUT_TOPIC") {
        cfg.input_topic = v;
    }
    if let Ok(v) = std::env::var("SEGBRIDGE_OUTPUT_TOPIC") {
        cfg.output_topic = v;
    }
    if let Ok(v) = std::env::var("SEGBRIDGE_QUEUE_SIZE") {
        match v.parse::<usize>() {
            Ok(size) => {
                cfg.input_queue_size = size;
                cfg.output_queue_size = size;
            }
            Err(e) => warn!(value = %v, error = %e, "ignoring SEGBRIDGE_QUEUE_SIZE"),
        }
    }
}
