use color_eyre::Result;
use color_eyre::eyre::eyre;
use serde_json::json;

/// Thin client for the Home Assistant REST API, used for server-side
/// template rendering
pub struct HomeAssistant {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HomeAssistant {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn request(&self, endpoint: &str, body: Option<serde_json::Value>) -> Result<reqwest::Response> {
        let url = format!("{}{endpoint}", self.url);

        let request = match body {
            Some(body) => self.client.post(&url).json(&body),
            None => self.client.get(&url),
        };

        Ok(request
            .bearer_auth(&self.token)
            .header("content-type", "application/json")
            .send()
            .await?)
    }

    /// Have Home Assistant render one of its own templates and return the
    /// resulting text
    pub async fn render_template(&self, template: &str) -> Result<String> {
        let response = self
            .request("/api/template", Some(json!({ "template": template })))
            .await?;

        if response.status().is_success() {
            return Ok(response.text().await?);
        }

        // HA reports template syntax problems in the error body
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|e| e.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| format!("status {status}"));

        Err(eyre!("template cannot be rendered: {message}"))
    }
}
