use crate::config::MqttConfig;

/// A variable fed by messages on a single MQTT topic
#[derive(Debug, Clone)]
pub struct MqttVariable {
    pub name: String,
    pub topic: String,
    pub qos: u8,
    pub parse_json: bool,
    pub template: String,
    pub update_template: String,
    pub startup: String,
    pub color: Option<String>,
}

impl MqttVariable {
    pub fn new(name: &str, config: MqttConfig) -> Self {
        Self {
            name: name.to_string(),
            topic: config.topic,
            qos: config.qos,
            parse_json: config.parse_json,
            template: config.template,
            update_template: config.update_template,
            startup: config.startup,
            color: config.color,
        }
    }
}
