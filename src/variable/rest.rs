use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::config::{RestConfig, RestMethod};
use crate::schedule;

/// A variable polled from a generic web endpoint on a cron schedule
#[derive(Debug, Clone)]
pub struct RestVariable {
    pub name: String,
    pub url: String,
    pub method: RestMethod,
    pub parse_json: bool,
    pub template: String,
    pub update_template: String,
    pub startup: String,
    pub color: Option<String>,
    pub schedule: cron::Schedule,
}

impl RestVariable {
    pub fn new(name: &str, config: RestConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            url: config.url,
            method: config.method,
            parse_json: config.parse_json,
            template: config.template,
            update_template: config.update_template,
            startup: config.startup,
            color: config.color,
            schedule: schedule::parse(&config.cron)?,
        })
    }

    /// Fetch the endpoint and return the response body. Non-success statuses
    /// are errors so the caller can log and keep the previous payload.
    pub async fn poll(&self, client: &reqwest::Client) -> Result<String> {
        let request = match self.method {
            RestMethod::Get => client.get(&self.url),
            RestMethod::Post => client.post(&self.url),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(eyre!(
                "poll of {} returned status {}",
                self.url,
                response.status()
            ));
        }

        Ok(response.text().await?)
    }
}
