use std::{sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{info, warn};

use prostat_common::{
    TOPIC_RELAY_COOL, TOPIC_RELAY_FAN, TOPIC_RELAY_HEAT, TOPIC_SENSOR_HUMIDITY,
    TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TEMP,
};

/// Contactor states observed on the wire, fed back into the room model.
#[derive(Debug, Clone, Copy, Default)]
struct ObservedRelays {
    heat: bool,
    cool: bool,
    fan: bool,
}

/// First-order room model: the reading leaks toward a slowly drifting ambient
/// and moves with whatever the contactors are doing.
struct SimulatedRoom {
    temperature_f: f32,
    humidity_pct: f32,
    step: u64,
}

impl SimulatedRoom {
    fn new() -> Self {
        Self {
            temperature_f: 70.0,
            humidity_pct: 42.0,
            step: 0,
        }
    }

    fn advance(&mut self, relays: ObservedRelays) -> (f32, f32) {
        self.step = self.step.wrapping_add(1);

        // Ambient wanders a few degrees over a long cycle.
        let phase = (self.step % 480) as f32 / 480.0 * std::f32::consts::TAU;
        let ambient = 68.0 + 4.0 * phase.sin();
        self.temperature_f += (ambient - self.temperature_f) * 0.02;

        if relays.heat {
            self.temperature_f += 0.15;
        }
        if relays.cool {
            self.temperature_f -= 0.12;
            self.humidity_pct -= 0.2;
        }
        if relays.fan && !relays.heat && !relays.cool {
            // Circulation alone evens the room toward ambient a bit faster.
            self.temperature_f += (ambient - self.temperature_f) * 0.02;
        }

        self.humidity_pct += (42.0 - self.humidity_pct) * 0.05;

        (self.temperature_f, self.humidity_pct)
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

    let mut mqtt_options = MqttOptions::new("prostat-sensor", mqtt_host, mqtt_port);
    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    // Relay topics are retained, so the model sees current output state right
    // after connecting.
    for topic in [TOPIC_RELAY_HEAT, TOPIC_RELAY_COOL, TOPIC_RELAY_FAN] {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .context("failed to subscribe to relay topics")?;
    }

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    let relays = Arc::new(Mutex::new(ObservedRelays::default()));

    let observed = relays.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let energized = message.payload.as_ref() == b"1";
                    let mut relays = observed.lock().await;
                    match message.topic.as_str() {
                        TOPIC_RELAY_HEAT => relays.heat = energized,
                        TOPIC_RELAY_COOL => relays.cool = energized,
                        TOPIC_RELAY_FAN => relays.fan = energized,
                        _ => {}
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

    let period_secs = std::env::var("PROSTAT_SENSOR_PERIOD_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(30);

    info!("sensor publisher started, period {period_secs}s");

    let mut room = SimulatedRoom::new();
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));

    loop {
        interval.tick().await;

        // Hardware integration point: swap the model for the room probe's
        // driver when one is attached.
        let observed = { *relays.lock().await };
        let (temperature_f, humidity_pct) = room.advance(observed);

        mqtt.publish(
            TOPIC_SENSOR_TEMP,
            QoS::AtLeastOnce,
            true,
            format!("{temperature_f:.1}"),
        )
        .await
        .context("failed to publish sensor temperature")?;
        mqtt.publish(
            TOPIC_SENSOR_HUMIDITY,
            QoS::AtLeastOnce,
            true,
            format!("{humidity_pct:.1}"),
        )
        .await
        .context("failed to publish sensor humidity")?;
    }
}
