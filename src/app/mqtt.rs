use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::eyre;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, Publish, QoS};
use serde_json::json;

use crate::app::App;
use crate::config::MqttSettings;
use crate::constants;
use crate::manager::MessageManager;

/// Build the broker connection. The last will flips the availability topic
/// to offline when the daemon drops off without a clean shutdown.
pub fn connect(settings: &MqttSettings) -> Result<(AsyncClient, EventLoop)> {
    let host = settings
        .host
        .as_deref()
        .ok_or_else(|| eyre!("mqtt host is not configured"))?;

    let mut options = MqttOptions::new("marquee", host, settings.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_last_will(LastWill::new(
        constants::MQTT_AVAILABLE,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username, password);
    }

    Ok(AsyncClient::new(options, 32))
}

pub fn qos(level: u8) -> QoS {
    match level {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Subscribe to the command topics plus every mqtt variable's topic
pub async fn subscribe(client: &AsyncClient, manager: &MessageManager) -> Result<()> {
    client
        .subscribe(constants::MQTT_SWITCH, QoS::AtLeastOnce)
        .await?;
    client
        .subscribe(constants::MQTT_NEW_TEXT, QoS::AtLeastOnce)
        .await?;
    // retained status restores the on/off state from the last run
    client
        .subscribe(constants::MQTT_STATUS, QoS::AtLeastOnce)
        .await?;

    for var in manager.mqtt_variables() {
        log::debug!("subscribing to {} for {}", var.topic, var.name);
        client.subscribe(&var.topic, qos(var.qos)).await?;
    }

    Ok(())
}

/// Announce the sign to Home Assistant as a light entity (on/off) and a
/// text entity (free-form messages)
pub async fn publish_discovery(client: &AsyncClient, settings: &MqttSettings) -> Result<()> {
    let device = json!({
        "identifiers": ["marquee_sign"],
        "name": settings.device_name,
        "manufacturer": "BetaBrite",
    });

    let light = json!({
        "name": settings.device_name,
        "unique_id": "marquee_sign_light",
        "command_topic": constants::MQTT_SWITCH,
        "state_topic": constants::MQTT_STATUS,
        "availability_topic": constants::MQTT_AVAILABLE,
        "json_attributes_topic": constants::MQTT_ATTRIBUTES,
        "device": device.clone(),
    });
    client
        .publish(
            format!(
                "{}/{}/marquee/config",
                settings.discovery_prefix,
                constants::DISCOVERY_LIGHT_CLASS
            ),
            QoS::AtLeastOnce,
            true,
            light.to_string(),
        )
        .await?;

    let text = json!({
        "name": format!("{} Text", settings.device_name),
        "unique_id": "marquee_sign_text",
        "command_topic": constants::MQTT_NEW_TEXT,
        "state_topic": constants::MQTT_CURRENT_TEXT,
        "availability_topic": constants::MQTT_AVAILABLE,
        "device": device,
    });
    client
        .publish(
            format!(
                "{}/{}/marquee/config",
                settings.discovery_prefix,
                constants::DISCOVERY_TEXT_CLASS
            ),
            QoS::AtLeastOnce,
            true,
            text.to_string(),
        )
        .await?;

    log::info!("published Home Assistant discovery config");
    Ok(())
}

pub async fn publish_available(client: &AsyncClient) {
    if let Err(e) = client
        .publish(constants::MQTT_AVAILABLE, QoS::AtLeastOnce, true, "online")
        .await
    {
        log::error!("failed to publish availability: {e}");
    }
}

pub async fn publish_status(client: &AsyncClient, state: &str) {
    if let Err(e) = client
        .publish(constants::MQTT_STATUS, QoS::AtLeastOnce, true, state)
        .await
    {
        log::error!("failed to publish status: {e}");
    }
}

/// Remove previously-published discovery entities by clearing the retained
/// config topics
pub async fn remove_discovery(client: &AsyncClient, settings: &MqttSettings) -> Result<()> {
    for class in [constants::DISCOVERY_LIGHT_CLASS, constants::DISCOVERY_TEXT_CLASS] {
        client
            .publish(
                format!("{}/{class}/marquee/config", settings.discovery_prefix),
                QoS::AtLeastOnce,
                true,
                "",
            )
            .await?;
    }
    Ok(())
}

pub async fn publish_attributes(client: &AsyncClient, queue: &str) {
    let attributes = json!({
        "active_queue": queue,
        "last_updated": chrono::Local::now().to_rfc3339(),
    })
    .to_string();
    if let Err(e) = client
        .publish(constants::MQTT_ATTRIBUTES, QoS::AtLeastOnce, true, attributes)
        .await
    {
        log::error!("failed to publish attributes: {e}");
    }
}

/// Dispatch one inbound publish: command topics first, then payload topics
/// owned by mqtt variables
pub async fn handle_publish(app: &mut App, publish: &Publish) -> Result<()> {
    let payload = String::from_utf8_lossy(&publish.payload).to_string();
    let topic = publish.topic.as_str();

    match topic {
        constants::MQTT_SWITCH => {
            let state = if payload == "ON" { "ON" } else { "OFF" };
            app.change_state(state).await?;

            if let Some(client) = &app.mqtt {
                publish_status(client, state).await;
                publish_attributes(client, &app.active_queue).await;
            }
        }
        constants::MQTT_STATUS => {
            // retained state from the previous run, replayed once at startup
            if publish.retain {
                log::info!("restoring sign state: {payload}");
                app.change_state(&payload).await?;
            }
        }
        constants::MQTT_NEW_TEXT => {
            // republish so the text entity state and any variable watching
            // the current_text topic both update
            if let Some(client) = &app.mqtt {
                client
                    .publish(
                        constants::MQTT_CURRENT_TEXT,
                        QoS::AtLeastOnce,
                        true,
                        payload,
                    )
                    .await?;
            }
        }
        _ => {
            let Some(var) = app.manager.variable_for_topic(topic).cloned() else {
                log::debug!("no variable subscribed to {topic}");
                return Ok(());
            };

            if !app.store.has_value(var.name()) {
                log::info!("first payload for {} arrived on {topic}", var.name());
            }

            let parse_json = match &var {
                crate::variable::Variable::Mqtt(m) => m.parse_json,
                _ => false,
            };

            app.store
                .set_payload(var.name(), crate::app::decode_payload(&payload, parse_json));
            app.cascade_update(&var).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
        // out of range collapses to fire-and-forget
        assert_eq!(qos(9), QoS::AtMostOnce);
    }

    #[test]
    fn test_connect_requires_host() {
        let settings = MqttSettings::default();
        assert!(connect(&settings).is_err());
    }
}
