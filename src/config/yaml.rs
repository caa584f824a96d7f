//! YAML configuration file structure (`biz.yaml`).
//!
//! All fields are optional so a partial file works; defaults and
//! environment overrides are applied when the file is merged into
//! [`super::ServerConfig`].
//!
//! # Example
//! ```yaml
//! server:
//!   addr: ":8000"
//!   idle_timeout_secs: 0
//!
//! provider:
//!   name: openai
//!   xiaozhi:
//!     base_url: "wss://api.tenclass.net/xiaozhi/v1/"
//!
//! openai:
//!   base_url: "wss://api.openai.com/v1/realtime"
//!   api_key: "sk-..."
//!   model: "gpt-4o-realtime-preview"
//!   voice: "alloy"
//!   system_prompt: "You are a helpful voice assistant."
//!
//! xiaozhi:
//!   format: opus
//!   transport: websocket
//!   sample_rate: 24000
//!   channels: 1
//!   frame_duration: 60
//! ```

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub provider: Option<ProviderYaml>,
    pub openai: Option<OpenAiYaml>,
    pub xiaozhi: Option<XiaozhiYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerYaml {
    pub addr: Option<String>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderYaml {
    pub name: Option<String>,
    pub xiaozhi: Option<XiaozhiProviderYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XiaozhiProviderYaml {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiYaml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XiaozhiYaml {
    pub format: Option<String>,
    pub transport: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub frame_duration: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_parses() {
        let yaml = r#"
provider:
  name: openai
openai:
  api_key: sk-test
  voice: verse
"#;
        let cfg: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.provider.unwrap().name.as_deref(), Some("openai"));
        let openai = cfg.openai.unwrap();
        assert_eq!(openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(openai.voice.as_deref(), Some("verse"));
        assert!(cfg.xiaozhi.is_none());
    }

    #[test]
    fn test_empty_yaml_parses() {
        let cfg: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.server.is_none());
        assert!(cfg.provider.is_none());
    }
}
