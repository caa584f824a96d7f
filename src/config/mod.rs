//! Gateway configuration.
//!
//! One YAML file (`biz.yaml`, looked up in `conf/` then the working
//! directory) merged over defaults, with the API key overridable from the
//! environment. The merged result is published once at startup as a
//! process-wide immutable snapshot; `reload` swaps the snapshot under a
//! readers-writer barrier. Components read through [`snapshot`] at use time
//! rather than capturing individual fields.

mod yaml;

pub use yaml::YamlConfig;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;

use yaml::{OpenAiYaml, ProviderYaml, ServerYaml, XiaozhiYaml};

/// Environment variable that overrides `openai.api_key`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Config file candidates relative to the working directory.
const CONFIG_PATHS: &[&str] = &["conf/biz.yaml", "biz.yaml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config file not found (looked for conf/biz.yaml and biz.yaml)")]
    NotFound,

    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen address; a bare `":port"` binds all interfaces.
    pub addr: String,
    /// Idle timeout in seconds for quiet connections; 0 disables.
    pub idle_timeout_secs: u64,
}

/// Provider selection: `openai` translates, anything else splices bytes
/// through to the configured xiaozhi upstream.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub xiaozhi_base_url: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
}

/// Audio parameters the gateway advertises in its own hello.
#[derive(Debug, Clone)]
pub struct XiaozhiSettings {
    pub format: String,
    pub transport: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub frame_duration: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub openai: OpenAiSettings,
    pub xiaozhi: XiaozhiSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                addr: ":8000".to_string(),
                idle_timeout_secs: 0,
            },
            provider: ProviderSettings {
                name: "openai".to_string(),
                xiaozhi_base_url: String::new(),
            },
            openai: OpenAiSettings {
                base_url: "wss://api.openai.com/v1/realtime".to_string(),
                api_key: String::new(),
                model: "gpt-4o-realtime-preview".to_string(),
                voice: "alloy".to_string(),
                system_prompt: String::new(),
            },
            xiaozhi: XiaozhiSettings {
                format: "opus".to_string(),
                transport: "websocket".to_string(),
                sample_rate: 24000,
                channels: 1,
                frame_duration: 60,
            },
        }
    }
}

impl ServerConfig {
    /// Load from the default file locations, apply environment overrides
    /// and validate. Startup aborts on any error here.
    pub fn load() -> Result<Self, ConfigError> {
        for candidate in CONFIG_PATHS {
            if Path::new(candidate).exists() {
                return Self::from_file(candidate);
            }
        }
        Err(ConfigError::NotFound)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let yaml: YamlConfig = serde_yaml::from_str(&raw)?;
        let mut config = Self::from_yaml(yaml);
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let mut config = Self::default();

        if let Some(ServerYaml {
            addr,
            idle_timeout_secs,
        }) = yaml.server
        {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            if let Some(idle) = idle_timeout_secs {
                config.server.idle_timeout_secs = idle;
            }
        }

        if let Some(ProviderYaml { name, xiaozhi }) = yaml.provider {
            if let Some(name) = name {
                config.provider.name = name;
            }
            if let Some(base_url) = xiaozhi.and_then(|x| x.base_url) {
                config.provider.xiaozhi_base_url = base_url;
            }
        }

        if let Some(OpenAiYaml {
            base_url,
            api_key,
            model,
            voice,
            system_prompt,
        }) = yaml.openai
        {
            if let Some(base_url) = base_url {
                config.openai.base_url = base_url;
            }
            if let Some(api_key) = api_key {
                config.openai.api_key = api_key;
            }
            if let Some(model) = model {
                config.openai.model = model;
            }
            if let Some(voice) = voice {
                config.openai.voice = voice;
            }
            if let Some(system_prompt) = system_prompt {
                config.openai.system_prompt = system_prompt;
            }
        }

        if let Some(XiaozhiYaml {
            format,
            transport,
            sample_rate,
            channels,
            frame_duration,
        }) = yaml.xiaozhi
        {
            if let Some(format) = format {
                config.xiaozhi.format = format;
            }
            if let Some(transport) = transport {
                config.xiaozhi.transport = transport;
            }
            if let Some(sample_rate) = sample_rate {
                config.xiaozhi.sample_rate = sample_rate;
            }
            if let Some(channels) = channels {
                config.xiaozhi.channels = channels;
            }
            if let Some(frame_duration) = frame_duration {
                config.xiaozhi.frame_duration = frame_duration;
            }
        }

        config
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            let key = key.trim();
            if !key.is_empty() {
                self.openai.api_key = key.to_string();
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.openai.api_key.is_empty() {
            return Err(ConfigError::MissingField("openai.api_key"));
        }
        if self.openai.base_url.is_empty() {
            return Err(ConfigError::MissingField("openai.base_url"));
        }
        if self.xiaozhi.format.is_empty() {
            return Err(ConfigError::MissingField("xiaozhi.format"));
        }
        if self.xiaozhi.transport.is_empty() {
            return Err(ConfigError::MissingField("xiaozhi.transport"));
        }
        Ok(())
    }

    /// Bind address with a bare `":port"` expanded to all interfaces.
    pub fn listen_addr(&self) -> String {
        if self.server.addr.starts_with(':') {
            format!("0.0.0.0{}", self.server.addr)
        } else {
            self.server.addr.clone()
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.server.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn is_translating(&self) -> bool {
        self.provider.name == "openai"
    }
}

static SNAPSHOT: RwLock<Option<Arc<ServerConfig>>> = RwLock::new(None);

/// Publish a configuration snapshot. Called once at startup and again by
/// [`reload`].
pub fn install(config: ServerConfig) {
    *SNAPSHOT.write() = Some(Arc::new(config));
}

/// The current process-wide configuration snapshot.
///
/// Panics if called before [`install`]; publishing the initial snapshot is
/// part of process startup.
pub fn snapshot() -> Arc<ServerConfig> {
    SNAPSHOT
        .read()
        .clone()
        .expect("configuration accessed before startup published it")
}

/// Re-read the config file and swap the snapshot. Connections established
/// before the swap keep the snapshot they started with.
pub fn reload() -> Result<(), ConfigError> {
    let config = ServerConfig::load()?;
    install(config);
    Ok(())
}
