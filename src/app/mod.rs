use std::sync::Arc;

use chrono::Duration;
use color_eyre::Result;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::constants;
use crate::home_assistant::HomeAssistant;
use crate::manager::MessageManager;
use crate::payload::PayloadStore;
use crate::sign::{SignInterface, SignObject};
use crate::variable::{Category, Variable};

pub mod cli;
pub mod main_loop;
pub mod mqtt;

/// Shared handle to the sign transport. The transport is stateful and
/// serial, so every connect-write-disconnect sequence runs under this one
/// lock; interleaved writes would corrupt the wire protocol.
pub type Device = Arc<Mutex<Box<dyn SignInterface>>>;

pub struct App {
    pub config: Config,
    pub manager: MessageManager,
    pub store: PayloadStore,
    pub device: Device,
    pub home_assistant: Option<HomeAssistant>,
    pub http: reqwest::Client,
    pub mqtt: Option<rumqttc::AsyncClient>,
    pub active_queue: String,
    pub running: bool,
}

impl App {
    pub fn new(config: Config, manager: MessageManager, device: Box<dyn SignInterface>) -> Result<Self> {
        let template_vars = manager.variables_by_category(Category::Template);
        let store = PayloadStore::new(&template_vars)?;

        let home_assistant = match (&config.home_assistant.url, &config.home_assistant.token) {
            (Some(url), Some(token)) => Some(HomeAssistant::new(url, token)),
            _ => None,
        };

        Ok(Self {
            config,
            manager,
            store,
            device: Arc::new(Mutex::new(device)),
            home_assistant,
            http: reqwest::Client::new(),
            mqtt: None,
            active_queue: constants::MAIN_QUEUE.to_string(),
            running: false,
        })
    }

    /// Run one operation against the sign with exclusive access, always
    /// disconnecting afterwards even when the write fails
    pub async fn with_device<F>(&self, operation: F) -> Result<()>
    where
        F: FnOnce(&mut dyn SignInterface) -> Result<()>,
    {
        let mut device = self.device.lock().await;
        device.connect()?;
        let result = operation(device.as_mut());
        device.disconnect();
        result
    }

    /// Push new text into a variable's allocated string slot. Variables
    /// without a slot were never placed on the display and are skipped.
    pub async fn update_string(&self, name: &str, message: &str) -> Result<()> {
        // underscores render as block glyphs on the sign
        let message = message.replace('_', " ");

        let Some(string) = self.manager.update_string(name, &message) else {
            log::debug!("can't find allocated object for {name}");
            return Ok(());
        };

        log::debug!(
            "updated {name}:'{}'",
            crate::sign::strip_control(&message)
        );
        self.with_device(|device| device.write(&SignObject::Str(string.clone())))
            .await
    }

    /// Render a template variable and write the result to the sign when the
    /// guard passes and the output changed
    pub async fn render_to_sign(&mut self, var: &Variable) -> Result<()> {
        if !self.store.should_update(var) {
            log::debug!("update conditional not met for {}", var.name());
            return Ok(());
        }

        if let Some(text) = self.store.render_variable(var) {
            self.update_string(var.name(), &text).await?;
        }

        Ok(())
    }

    /// A payload write for `var` just completed: re-render it, then walk its
    /// dependents. The triggering write is processed before the cascade so
    /// dependents read the new payload.
    pub async fn cascade_update(&mut self, var: &Variable) -> Result<()> {
        self.render_to_sign(var).await?;

        for dependent in self.store.dependents(var.name()).to_vec() {
            let Some(dep_var) = self.manager.get_variable(&dependent).cloned() else {
                continue;
            };
            self.render_to_sign(&dep_var).await?;
        }

        Ok(())
    }

    /// Check every polling variable against its schedule and refresh the due
    /// ones. External failures are logged and leave the previous value on
    /// the sign.
    pub async fn poll(&mut self, offset: Duration) {
        let now = chrono::Local::now();
        let due: Vec<Variable> = self
            .manager
            .variables_by_category(Category::Polling)
            .into_iter()
            .filter(|v| v.should_poll(now, offset))
            .cloned()
            .collect();

        for var in due {
            log::info!("Polling {}", var.name());

            if let Err(e) = self.poll_variable(&var).await {
                log::error!("poll of {} failed: {e}", var.name());
            }
        }
    }

    async fn poll_variable(&mut self, var: &Variable) -> Result<()> {
        match var {
            Variable::Date(date_var) => {
                self.update_string(var.name(), &date_var.current_text())
                    .await?;
            }
            Variable::Rest(rest_var) => {
                let body = rest_var.poll(&self.http).await?;
                let payload = decode_payload(&body, rest_var.parse_json);
                self.store.set_payload(var.name(), payload);
                self.cascade_update(var).await?;
            }
            Variable::Dynamic(_) => {
                self.cascade_update(var).await?;
            }
            Variable::HomeAssistant(ha_var) => {
                let Some(client) = &self.home_assistant else {
                    log::error!(
                        "Home Assistant interface is not loaded, specify HA url and token to load"
                    );
                    return Ok(());
                };

                let text = client.render_template(&ha_var.template).await?;
                let text = text.trim().to_string();
                self.store
                    .set_payload(var.name(), serde_json::Value::String(text.clone()));
                self.update_string(var.name(), &text).await?;

                // derived variables may read this payload
                self.cascade_update(var).await?;
            }
            // static, time and mqtt variables never poll
            _ => {}
        }

        Ok(())
    }

    /// Turn the display on or off by swapping the priority off-message
    pub async fn change_state(&self, state: &str) -> Result<()> {
        // a single space blanks the display, an empty write clears the
        // priority flag again
        let message = if state == "OFF" { " " } else { "" };
        let text = self
            .manager
            .update_text(constants::SIGN_OFF, message, true)?;

        log::info!("sign state changed to {state}");
        self.with_device(|device| device.write(&SignObject::Text(text.clone())))
            .await
    }

    /// Re-evaluate queue activation templates and swap the run sequence when
    /// the active queue changed
    pub async fn swap_queue(&mut self) -> Result<()> {
        let new_queue = self.manager.find_active_queue(&self.store);
        if new_queue == self.active_queue {
            return Ok(());
        }

        let run_list = self.manager.get_queue(&new_queue).to_vec();

        self.with_device(|device| device.set_run_sequence(&run_list))
            .await?;

        log::info!("loading message queue: {new_queue}");
        self.active_queue = new_queue;

        if let Some(client) = &self.mqtt {
            mqtt::publish_attributes(client, &self.active_queue).await;
        }

        Ok(())
    }

    pub fn quit(&mut self) {
        self.running = false;
    }
}

/// Decode an inbound payload, keeping it structured when the variable wants
/// JSON and the body parses
pub fn decode_payload(body: &str, parse_json: bool) -> serde_json::Value {
    if parse_json
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && (value.is_object() || value.is_array())
    {
        return value;
    }

    serde_json::Value::String(body.to_string())
}
