//! Instance configuration, read once at startup.
//!
//! Supplied as a base64-encoded `RuntimeConfig` protobuf. Empty input
//! selects standalone mode with a synthetic test instance.
//!
//! `RuntimeConfig` declares only the fields the bridge reads, under the
//! field numbers of the dev server's runtime `Config` message (`app_id` 1,
//! `version_id` 2, `api_port` 5, `datacenter` 12, `instance_id` 13). Every
//! other field of that message is skipped on decode.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Startup configuration message
#[derive(Clone, PartialEq, Message)]
pub struct RuntimeConfig {
    #[prost(bytes = "vec", tag = "1")]
    pub app_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub version_id: Vec<u8>,
    #[prost(int32, tag = "5")]
    pub api_port: i32,
    #[prost(string, tag = "12")]
    pub datacenter: String,
    #[prost(string, tag = "13")]
    pub instance_id: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("could not base64 decode configuration: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("could not decode runtime config: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("runtime config field {0} is not UTF-8")]
    InvalidUtf8(&'static str),

    #[error("runtime config api_port {0} is out of range")]
    InvalidPort(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub app_id: String,
    pub version_id: String,
    pub instance_id: String,
    pub datacenter: String,
    pub api_port: u16,
    /// Running under the development app server. Tests may clear it to
    /// exercise production-only paths.
    #[serde(default = "dev_default")]
    pub is_dev: bool,
}

fn dev_default() -> bool {
    true
}

/// Where the active configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigMode {
    Supplied,
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub instance: InstanceConfig,
    pub mode: ConfigMode,
}

impl InstanceConfig {
    /// Synthetic instance used when no configuration is supplied.
    pub fn standalone() -> Self {
        Self {
            app_id: "s~test".to_string(),
            version_id: "v.123456789".to_string(),
            instance_id: "t1".to_string(),
            datacenter: "us1".to_string(),
            api_port: 0,
            is_dev: true,
        }
    }

    pub fn from_runtime_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let api_port = u16::try_from(config.api_port).map_err(|_| ConfigError::InvalidPort(config.api_port))?;
        Ok(Self {
            app_id: String::from_utf8(config.app_id).map_err(|_| ConfigError::InvalidUtf8("app_id"))?,
            version_id: String::from_utf8(config.version_id).map_err(|_| ConfigError::InvalidUtf8("version_id"))?,
            instance_id: config.instance_id,
            datacenter: config.datacenter,
            api_port,
            is_dev: true,
        })
    }

    /// Parse base64 text. Blank input means standalone mode.
    pub fn from_base64(raw: &[u8]) -> Result<LoadedConfig, ConfigError> {
        let text: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        if text.is_empty() {
            return Ok(LoadedConfig {
                instance: Self::standalone(),
                mode: ConfigMode::Standalone,
            });
        }
        let bytes = STANDARD.decode(&text)?;
        let config = RuntimeConfig::decode(bytes.as_slice())?;
        Ok(LoadedConfig {
            instance: Self::from_runtime_config(config)?,
            mode: ConfigMode::Supplied,
        })
    }

    /// Backend RPC endpoint derived from the API port.
    pub fn api_address(&self) -> String {
        format!("http://localhost:{}", self.api_port)
    }
}

/// Read the whole reader and parse it with [`InstanceConfig::from_base64`].
pub fn read_config(mut reader: impl Read) -> Result<LoadedConfig, ConfigError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    InstanceConfig::from_base64(&raw)
}

/// Process-wide configuration handle.
///
/// Read-only after startup except through [`SharedConfig::stub`].
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<RwLock<InstanceConfig>>);

impl SharedConfig {
    pub fn new(config: InstanceConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn get(&self) -> InstanceConfig {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the instance identity. Intended for tests; the dev-server
    /// flag is left as is.
    pub fn stub(&self, app_id: &str, version_id: &str, instance_id: &str, datacenter: &str, api_port: u16) {
        let mut config = self.0.write().unwrap_or_else(PoisonError::into_inner);
        config.app_id = app_id.to_string();
        config.version_id = version_id.to_string();
        config.instance_id = instance_id.to_string();
        config.datacenter = datacenter.to_string();
        config.api_port = api_port;
    }

    pub fn is_dev_app_server(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_dev
    }

    /// Make the app believe it runs on production servers (`false`) or
    /// under the dev server (`true`).
    pub fn set_dev_app_server(&self, dev: bool) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).is_dev = dev;
        tracing::debug!(dev, "dev app server flag changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(config: &RuntimeConfig) -> String {
        STANDARD.encode(config.encode_to_vec())
    }

    #[test]
    fn test_empty_input_is_standalone() {
        let loaded = InstanceConfig::from_base64(b"").unwrap();
        assert_eq!(loaded.mode, ConfigMode::Standalone);
        assert_eq!(loaded.instance, InstanceConfig::standalone());

        let loaded = read_config(&b" \n"[..]).unwrap();
        assert_eq!(loaded.mode, ConfigMode::Standalone);
    }

    #[test]
    fn test_supplied_config() {
        let config = RuntimeConfig {
            app_id: b"s~myapp".to_vec(),
            version_id: b"2.1".to_vec(),
            api_port: 9011,
            instance_id: "i-7".to_string(),
            datacenter: "eu2".to_string(),
        };
        let text = format!("{}\n", encoded(&config));

        let loaded = read_config(text.as_bytes()).unwrap();
        assert_eq!(loaded.mode, ConfigMode::Supplied);
        assert_eq!(loaded.instance.app_id, "s~myapp");
        assert_eq!(loaded.instance.version_id, "2.1");
        assert_eq!(loaded.instance.instance_id, "i-7");
        assert_eq!(loaded.instance.datacenter, "eu2");
        assert_eq!(loaded.instance.api_port, 9011);
        assert_eq!(loaded.instance.api_address(), "http://localhost:9011");
    }

    #[test]
    fn test_malformed_input_is_error() {
        assert!(matches!(InstanceConfig::from_base64(b"!!not base64!!"), Err(ConfigError::Base64(_))));

        let garbage = STANDARD.encode([0xff, 0xff, 0xff]);
        assert!(matches!(InstanceConfig::from_base64(garbage.as_bytes()), Err(ConfigError::Decode(_))));

        let bad_port = RuntimeConfig {
            api_port: 70_000,
            ..Default::default()
        };
        assert!(matches!(
            InstanceConfig::from_base64(encoded(&bad_port).as_bytes()),
            Err(ConfigError::InvalidPort(70_000))
        ));
    }

    #[test]
    fn test_stub_replaces_shared_config() {
        let shared = SharedConfig::new(InstanceConfig::standalone());
        let observer = shared.clone();

        shared.stub("s~x", "v2", "i2", "dc2", 4242);
        assert_eq!(observer.get().app_id, "s~x");
        assert_eq!(observer.get().api_port, 4242);
    }

    #[test]
    fn test_dev_flag_survives_stub() {
        let shared = SharedConfig::new(InstanceConfig::standalone());
        assert!(shared.is_dev_app_server());

        shared.set_dev_app_server(false);
        shared.stub("s~x", "v2", "i2", "dc2", 4242);
        assert!(!shared.is_dev_app_server());

        shared.set_dev_app_server(true);
        assert!(shared.get().is_dev);
    }

    #[test]
    fn test_fields_use_dev_server_numbers() {
        // api_port (5) = 9011, datacenter (12) = "eu", instance_id (13) = "i"
        let bytes = [0x28, 0xb3, 0x46, 0x62, 0x02, b'e', b'u', 0x6a, 0x01, b'i'];
        let config = RuntimeConfig::decode(&bytes[..]).unwrap();
        assert_eq!(config.api_port, 9011);
        assert_eq!(config.datacenter, "eu");
        assert_eq!(config.instance_id, "i");
    }
}
