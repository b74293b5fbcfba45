//! Fire-and-forget MQTT publishing of recognized transcriptions.
//!
//! No pack example wires up MQTT; `rumqttc` is the standard async-MQTT crate
//! for a Tokio codebase, same ecosystem-idiom reasoning as reaching for
//! `tokio-tungstenite` for the STT/TTS WebSocket endpoints. Optional per
//! `mqtt.brokerUrl`: absent configuration means `connect` returns `None` and
//! the orchestrator simply has nothing to call.

use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;

use crate::config::MqttConfig;

const CLIENT_ID: &str = "voice-gateway";
const TOPIC: &str = "voice-gateway/transcription";
const KEEP_ALIVE_SECS: u64 = 30;

/// Owns the MQTT client and the background task draining its event loop.
/// Publish failures are logged and otherwise ignored — this is a telemetry
/// sink, not part of the voice-interaction critical path.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Connect if `mqtt.brokerUrl` is configured; `None` otherwise. Never
    /// fails the caller even if the broker is unreachable — connection
    /// errors surface later, per publish, as logged warnings.
    pub fn connect(config: &MqttConfig) -> Option<Self> {
        let broker_url = config.broker_url.as_ref()?;
        let (host, port) = parse_broker_url(broker_url);

        let mut options = MqttOptions::new(CLIENT_ID, host, port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("mqtt event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Some(Self { client })
    }

    /// Publish a recognized transcription. Fire-and-forget: spawns the
    /// publish and logs failure, never blocks or propagates an error to the
    /// caller.
    pub fn publish_transcription(&self, text: &str) {
        let client = self.client.clone();
        let payload = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = client
                .publish(TOPIC, QoS::AtMostOnce, false, payload)
                .await
            {
                log::warn!("failed to publish transcription over mqtt: {e}");
            }
        });
    }
}

/// Parse a `host` or `host:port` broker URL (an optional leading
/// `mqtt://`/`tcp://` scheme is stripped), defaulting to MQTT's standard
/// port 1883.
fn parse_broker_url(url: &str) -> (String, u16) {
    let without_scheme = url.splitn(2, "://").last().unwrap_or(url);
    match without_scheme.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (without_scheme.to_string(), 1883),
        },
        None => (without_scheme.to_string(), 1883),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_broker_url_strips_scheme_and_splits_port() {
        assert_eq!(
            parse_broker_url("mqtt://broker.local:1884"),
            ("broker.local".to_string(), 1884)
        );
    }

    #[test]
    fn parse_broker_url_defaults_to_1883_without_a_port() {
        assert_eq!(parse_broker_url("broker.local"), ("broker.local".to_string(), 1883));
    }

    #[test]
    fn parse_broker_url_handles_bare_host_with_scheme() {
        assert_eq!(
            parse_broker_url("tcp://10.0.0.5"),
            ("10.0.0.5".to_string(), 1883)
        );
    }

    #[test]
    fn connect_returns_none_without_a_configured_broker_url() {
        let config = MqttConfig { broker_url: None };
        assert!(MqttPublisher::connect(&config).is_none());
    }
}
