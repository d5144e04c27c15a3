use chrono::Local;
use color_eyre::Result;

use crate::config::{DateConfig, TimeConfig};
use crate::schedule;

/// The current date, refreshed on the sign once per day at midnight
#[derive(Debug, Clone)]
pub struct DateVariable {
    pub name: String,
    pub format: String,
    pub color: Option<String>,
    pub schedule: cron::Schedule,
}

impl DateVariable {
    pub fn new(name: &str, config: DateConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            format: config.format,
            color: config.color,
            // the date only changes at midnight, the schedule is fixed
            schedule: schedule::parse("0 0 * * *")?,
        })
    }

    /// Today's date in the configured strftime format
    pub fn current_text(&self) -> String {
        Local::now().format(&self.format).to_string()
    }
}

/// The sign's own clock. Written once at startup with the configured
/// 12/24 hour format; the hardware keeps it current from there.
#[derive(Debug, Clone)]
pub struct TimeVariable {
    pub name: String,
    pub format: u8,
    pub color: Option<String>,
}

impl TimeVariable {
    pub fn new(name: &str, config: TimeConfig) -> Self {
        Self {
            name: name.to_string(),
            format: config.format,
            color: config.color,
        }
    }

    pub fn twenty_four_hour(&self) -> bool {
        self.format == 24
    }

    pub fn startup_text(&self) -> String {
        let format = if self.twenty_four_hour() {
            "%H:%M"
        } else {
            "%I:%M%p"
        };
        Local::now().format(format).to_string()
    }
}
