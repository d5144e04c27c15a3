use std::collections::HashMap;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::variable::{DEFAULT_CRON, DEFAULT_TEMPLATE, DEFAULT_UPDATE_TEMPLATE};

/// Daemon settings, loaded from the TOML config file
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sign: SignConfig,
    pub mqtt: MqttSettings,
    pub home_assistant: HomeAssistantSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SignConfig {
    /// Serial device path, or "cli" to print writes instead
    pub device: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker host; MQTT is skipped entirely when unset
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Publish Home Assistant MQTT discovery configs on connect
    pub discovery: bool,
    pub discovery_prefix: String,
    pub device_name: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HomeAssistantSettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: String,
    pub log_to_console: bool,
    pub append_to_file: bool,
    pub rotate_logs: bool,
    pub rotation_size_mb: u64,
    pub keep_log_files: u64,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 1883,
            username: None,
            password: None,
            discovery: false,
            discovery_prefix: "homeassistant".to_string(),
            device_name: "Marquee Sign".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            log_to_console: false,
            append_to_file: true,
            rotate_logs: false,
            rotation_size_mb: 10,
            keep_log_files: 3,
        }
    }
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => dirs::config_dir()
                .ok_or_else(|| eyre!("no config directory for this platform"))?
                .join("marquee")
                .join("config.toml"),
        };

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let default_config = Config::default();
            let toml_string = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_string)?;

            eprintln!("Created default config file at: {}", config_path.display());

            return Ok(default_config);
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_update_template() -> String {
    DEFAULT_UPDATE_TEMPLATE.to_string()
}

fn default_cron() -> String {
    DEFAULT_CRON.to_string()
}

fn default_true() -> bool {
    true
}

fn default_date_format() -> String {
    "%m/%d/%y".to_string()
}

fn default_time_format() -> u8 {
    12
}

/// One variable entry in the layout file; the tag is the variable kind and
/// an unknown kind fails deserialization, which is fatal at load
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableConfig {
    Static(StaticConfig),
    Date(DateConfig),
    Time(TimeConfig),
    Dynamic(DynamicConfig),
    Mqtt(MqttConfig),
    Rest(RestConfig),
    HomeAssistant(HomeAssistantConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateConfig {
    #[serde(default = "default_date_format")]
    pub format: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeConfig {
    /// 12 or 24 hour clock
    #[serde(default = "default_time_format")]
    pub format: u8,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicConfig {
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_update_template")]
    pub update_template: String,
    #[serde(default)]
    pub startup: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    /// Decode JSON payloads into structured values when possible
    #[serde(default = "default_true")]
    pub parse_json: bool,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_update_template")]
    pub update_template: String,
    #[serde(default)]
    pub startup: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl MqttConfig {
    /// Config for the internal text-entity variable, which only has a topic
    pub fn for_topic(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            qos: 0,
            parse_json: true,
            template: default_template(),
            update_template: default_update_template(),
            startup: String::new(),
            color: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    pub url: String,
    #[serde(default = "RestConfig::default_method")]
    pub method: RestMethod,
    #[serde(default = "default_true")]
    pub parse_json: bool,
    #[serde(default = "default_cron")]
    pub cron: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_update_template")]
    pub update_template: String,
    #[serde(default)]
    pub startup: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl RestConfig {
    fn default_method() -> RestMethod {
        RestMethod::Get
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantConfig {
    /// The template, in Home Assistant's own dialect, rendered server-side
    pub template: String,
    #[serde(default = "default_cron")]
    pub cron: String,
    #[serde(default)]
    pub startup: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// A message is one or more variable names composed into a single text object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageVars {
    One(String),
    Many(Vec<String>),
}

impl MessageVars {
    pub fn names(&self) -> Vec<&str> {
        match self {
            MessageVars::One(name) => vec![name.as_str()],
            MessageVars::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

fn default_mode() -> String {
    "rotate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    pub message: MessageVars,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub speed: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    /// Boolean template deciding whether this queue takes over from main
    #[serde(default)]
    pub active_template: Option<String>,
    pub queue: Vec<MessageConfig>,
}

/// The sign layout: variable definitions plus the display queues that
/// compose them into messages
#[derive(Debug, Deserialize)]
pub struct Layout {
    pub variables: HashMap<String, VariableConfig>,
    pub display: Vec<QueueConfig>,
}

impl Layout {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read layout file {}: {e}", path.display()))?;
        let layout: Layout =
            toml::from_str(&contents).map_err(|e| eyre!("error in layout file: {e}"))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Structural checks that must hold before the engine starts
    fn validate(&self) -> Result<()> {
        for reserved in [constants::SIGN_OFF, constants::TEXT_ENTITY_VARIABLE] {
            if self.variables.contains_key(reserved) {
                return Err(eyre!("variable name '{reserved}' is reserved"));
            }
        }

        if !self.display.iter().any(|q| q.name == constants::MAIN_QUEUE) {
            return Err(eyre!(
                "layout must define a '{}' queue",
                constants::MAIN_QUEUE
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for queue in &self.display {
            if !seen.insert(queue.name.as_str()) {
                return Err(eyre!("duplicate display queue '{}'", queue.name));
            }
            if queue.queue.is_empty() {
                return Err(eyre!("display queue '{}' has no messages", queue.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"
[variables.greeting]
type = "static"
text = "Hello"

[variables.temperature]
type = "mqtt"
topic = "home/temp"

[[display]]
name = "main"
[[display.queue]]
message = ["greeting", "temperature"]
mode = "rotate"
color = "green"
"#;

    #[test]
    fn test_layout_parses() {
        let layout: Layout = toml::from_str(LAYOUT).unwrap();
        assert_eq!(layout.variables.len(), 2);
        assert_eq!(layout.display.len(), 1);
        assert_eq!(layout.display[0].queue[0].message.names(), vec![
            "greeting",
            "temperature"
        ]);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bad = "[variables.x]\ntype = \"warp\"\n\n[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"x\"";
        assert!(toml::from_str::<Layout>(bad).is_err());
    }

    #[test]
    fn test_single_message_string() {
        let layout: Layout = toml::from_str(
            "[variables.a]\ntype = \"static\"\ntext = \"hi\"\n\n[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"a\"",
        )
        .unwrap();
        assert_eq!(layout.display[0].queue[0].message.names(), vec!["a"]);
    }

    #[test]
    fn test_reserved_name_rejected() {
        let bad = format!(
            "[variables.{}]\ntype = \"static\"\ntext = \"x\"\n\n[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"a\"",
            crate::constants::SIGN_OFF
        );
        let layout: Layout = toml::from_str(&bad).unwrap();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_main_queue_required() {
        let bad = "[variables.a]\ntype = \"static\"\ntext = \"x\"\n\n[[display]]\nname = \"alerts\"\n[[display.queue]]\nmessage = \"a\"";
        let layout: Layout = toml::from_str(bad).unwrap();
        assert!(layout.validate().is_err());
    }
}
