use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, info, warn};

use gaslog_common::{TOPIC_SENSOR_TEMP, TOPIC_STATE_VALVE};

/// First-order room model: drifts toward ambient, gains heat while the log burns.
#[derive(Debug, Clone, PartialEq)]
struct Room {
    temperature_f: f32,
    ambient_f: f32,
    /// °F per second added while the valve is open.
    burner_rate: f32,
    /// Fraction of the gap to ambient lost per second.
    loss_rate: f32,
}

impl Room {
    fn new(ambient_f: f32) -> Self {
        Self {
            temperature_f: ambient_f,
            ambient_f,
            burner_rate: 0.02,
            loss_rate: 0.0005,
        }
    }

    fn step(&mut self, elapsed: Duration, heating: bool) -> f32 {
        let secs = elapsed.as_secs_f32();
        let loss = (self.temperature_f - self.ambient_f) * self.loss_rate * secs;
        let gain = if heating { self.burner_rate * secs } else { 0.0 };
        self.temperature_f += gain - loss;
        self.temperature_f
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let ambient_f = std::env::var("ROOM_AMBIENT_F")
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(64.0);

    let mut mqtt_options = MqttOptions::new("gaslog-sensor", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    let valve_open = Arc::new(AtomicBool::new(false));
    let listener_flag = valve_open.clone();
    let listener_client = mqtt.clone();

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if let Err(err) = listener_client
                        .subscribe(TOPIC_STATE_VALVE, QoS::AtMostOnce)
                        .await
                    {
                        warn!("sensor subscribe failed: {err}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message)))
                    if message.topic == TOPIC_STATE_VALVE =>
                {
                    let open = message.payload.as_ref() == b"OPEN";
                    if listener_flag.swap(open, Ordering::Relaxed) != open {
                        info!(open, "valve state changed");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("sensor mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    info!(ambient_f, "sensor publisher started");

    let period = Duration::from_secs(5);
    let mut room = Room::new(ambient_f);
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let temperature_f = room.step(period, valve_open.load(Ordering::Relaxed));
        debug!(temperature_f, "room sample");

        mqtt.publish(
            TOPIC_SENSOR_TEMP,
            QoS::AtLeastOnce,
            false,
            format!("{temperature_f:.2}"),
        )
        .await
        .context("failed to publish sensor temperature")?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_warms_while_heating_and_cools_back() {
        let mut room = Room::new(64.0);
        for _ in 0..60 {
            room.step(Duration::from_secs(5), true);
        }
        let warmed = room.temperature_f;
        assert!(warmed > 68.0);

        room.step(Duration::from_secs(600), false);
        assert!(room.temperature_f < warmed);
        assert!(room.temperature_f > 64.0);
    }

    #[test]
    fn idle_room_stays_at_ambient() {
        let mut room = Room::new(60.0);
        assert_eq!(room.step(Duration::from_secs(30), false), 60.0);
    }
}
