use color_eyre::Result;

use crate::config::HomeAssistantConfig;
use crate::schedule;

/// A variable whose template is rendered by Home Assistant itself. The
/// rendered text comes back over the REST API on each poll.
#[derive(Debug, Clone)]
pub struct HomeAssistantVariable {
    pub name: String,
    pub template: String,
    pub startup: String,
    pub color: Option<String>,
    pub schedule: cron::Schedule,
}

impl HomeAssistantVariable {
    pub fn new(name: &str, config: HomeAssistantConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            template: config.template,
            startup: config.startup,
            color: config.color,
            schedule: schedule::parse(&config.cron)?,
        })
    }
}
