use color_eyre::Result;

use crate::config::{DynamicConfig, StaticConfig};
use crate::schedule;

/// Text that is written once at startup and never updated again
#[derive(Debug, Clone)]
pub struct StaticVariable {
    pub name: String,
    pub text: String,
    pub color: Option<String>,
}

impl StaticVariable {
    pub fn new(name: &str, config: StaticConfig) -> Self {
        Self {
            name: name.to_string(),
            text: config.text,
            color: config.color,
        }
    }
}

/// Text composed from other variables' payloads. Re-rendered once per minute
/// and whenever a variable referenced in the template changes.
#[derive(Debug, Clone)]
pub struct DynamicVariable {
    pub name: String,
    pub template: String,
    pub update_template: String,
    pub startup: String,
    pub color: Option<String>,
    pub schedule: cron::Schedule,
}

impl DynamicVariable {
    pub fn new(name: &str, config: DynamicConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            template: config.template,
            update_template: config.update_template,
            startup: config.startup,
            color: config.color,
            // derived text tracks the minute tick, not a user schedule
            schedule: schedule::parse("*/1 * * * *")?,
        })
    }
}
