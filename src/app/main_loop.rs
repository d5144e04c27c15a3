use std::time::Duration;

use rumqttc::{ConnectionError, Event, EventLoop, Packet, QoS};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Interval, MissedTickBehavior};

use super::App;
use crate::app::mqtt;
use crate::schedule;

/// Trait for main application loop
pub trait AppMainLoop {
    async fn run(self, eventloop: Option<EventLoop>) -> color_eyre::Result<()>
    where
        Self: Sized;
}

/// One tick per minute, aligned to the minute boundary. A tick delayed past
/// its slot is dropped rather than replayed, so a slow device write cannot
/// make the same cron period poll twice.
fn minute_interval(seconds_into_minute: u64) -> Interval {
    let first_tick =
        tokio::time::Instant::now() + Duration::from_secs(60 - seconds_into_minute % 60);
    let mut tick = tokio::time::interval_at(first_tick, Duration::from_secs(60));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

/// Poll the broker connection, or park forever when MQTT is not configured
async fn next_mqtt_event(eventloop: &mut Option<EventLoop>) -> Result<Event, ConnectionError> {
    match eventloop {
        Some(eventloop) => eventloop.poll().await,
        None => std::future::pending().await,
    }
}

impl AppMainLoop for App {
    /// Allocate the sign, run the initial poll, then service scheduler ticks
    /// and MQTT traffic until shutdown.
    async fn run(mut self, mut eventloop: Option<EventLoop>) -> color_eyre::Result<()> {
        self.running = true;

        // one connected session for the whole allocation pass
        {
            let device = self.device.clone();
            let mut device = device.lock().await;
            device.connect()?;
            device.clear_memory()?;

            let startup = self.manager.startup(device.as_mut())?;

            device.allocate(&startup.allocate)?;
            device.set_run_sequence(&startup.run)?;

            // pre-load every slot so the sign shows startup text immediately
            for object in &startup.allocate {
                device.write(object)?;
            }

            device.disconnect();
        }

        // publishes queue until the event loop flushes them on connect;
        // subscriptions happen on ConnAck so reconnects restore them too
        if let Some(client) = self.mqtt.clone() {
            if self.config.mqtt.discovery {
                mqtt::publish_discovery(&client, &self.config.mqtt).await?;
            } else {
                mqtt::remove_discovery(&client, &self.config.mqtt).await?;
            }

            mqtt::publish_available(&client).await;
            mqtt::publish_attributes(&client, &self.active_queue).await;
        }

        // the wide offset makes every polling variable due once at startup
        self.poll(schedule::startup_offset()).await;
        if let Err(e) = self.swap_queue().await {
            log::error!("queue swap failed: {e}");
        }

        // align polling to minute boundaries, cron precision is one minute
        let mut tick = minute_interval((chrono::Local::now().timestamp() % 60) as u64);

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        log::info!("Entering event-driven main loop");

        while self.running {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll(schedule::tick_offset()).await;

                    if let Err(e) = self.swap_queue().await {
                        log::error!("queue swap failed: {e}");
                    }
                }

                event = next_mqtt_event(&mut eventloop) => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if let Err(e) = mqtt::handle_publish(&mut self, &publish).await {
                                log::error!("failed to handle message on {}: {e}", publish.topic);
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            if let Some(client) = self.mqtt.clone() {
                                log::info!("broker session established");
                                mqtt::subscribe(&client, &self.manager).await?;
                                mqtt::publish_available(&client).await;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log::error!("MQTT connection error: {e}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }

                _ = sigint.recv() => {
                    log::info!("Received SIGINT, shutting down gracefully");
                    self.quit();
                }

                _ = sigterm.recv() => {
                    log::info!("Received SIGTERM, shutting down gracefully");
                    self.quit();
                }
            }
        }

        log::info!("Exiting main loop");

        if let Some(client) = &self.mqtt
            && let Err(e) = client
                .publish(crate::constants::MQTT_AVAILABLE, QoS::AtLeastOnce, true, "offline")
                .await
        {
            log::error!("failed to publish offline availability: {e}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minute_interval_drops_missed_ticks() {
        let tick = minute_interval(45);
        assert_eq!(tick.period(), Duration::from_secs(60));
        assert_eq!(tick.missed_tick_behavior(), MissedTickBehavior::Skip);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_interval_aligns_to_boundary() {
        let start = tokio::time::Instant::now();

        let mut tick = minute_interval(45);
        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }
}
