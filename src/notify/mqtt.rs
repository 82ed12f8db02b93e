//! MQTT alert channel.
//!
//! Publishes a JSON manifest to `<prefix>/alert` and each attachment's bytes
//! to `<prefix>/evidence/<file_name>`, all at QoS 1. The connection event loop
//! runs on its own thread for as long as the notifier lives.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use std::time::Duration;

use super::{AlertMessage, Notifier};

pub const DEFAULT_TOPIC_PREFIX: &str = "crash_sentinel";
pub const DEFAULT_CLIENT_ID: &str = "crash-sentinel";

/// Broker address as host, port and TLS flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// MQTT channel settings.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub broker_addr: String,
    pub topic_prefix: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttSettings {
    pub fn new(broker_addr: &str) -> Self {
        Self {
            broker_addr: broker_addr.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            password: None,
        }
    }

    pub fn alert_topic(&self) -> String {
        format!("{}/alert", self.topic_prefix.trim_end_matches('/'))
    }

    pub fn evidence_topic(&self, file_name: &str) -> String {
        format!(
            "{}/evidence/{}",
            self.topic_prefix.trim_end_matches('/'),
            file_name
        )
    }
}

pub struct MqttNotifier {
    settings: MqttSettings,
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttNotifier {
    pub fn connect(settings: MqttSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker_addr, false)?;
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, 10);
        log::info!(
            "MQTT alerts via {}:{} (TLS: {}, prefix: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.topic_prefix
        );
        Ok(Self {
            settings,
            client,
            connection_handle: Some(spawn_event_loop(connection)),
        })
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .with_context(|| format!("publish to {}", topic))?;
        Ok(())
    }
}

impl Notifier for MqttNotifier {
    fn channel(&self) -> &'static str {
        "mqtt"
    }

    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        let manifest = serde_json::to_vec(&message.manifest())?;
        self.publish(&self.settings.alert_topic(), &manifest)?;
        for attachment in &message.attachments {
            self.publish(
                &self.settings.evidence_topic(&attachment.file_name),
                &attachment.bytes,
            )?;
        }
        Ok(())
    }
}

impl Drop for MqttNotifier {
    fn drop(&mut self) {
        if let Err(e) = self.client.disconnect() {
            log::debug!("MQTT disconnect: {}", e);
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_event_loop(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Parse `host:port`, `[v6]:port`, or a `mqtt://`/`tcp://`/`mqtts://`/`ssl://` URL.
pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest.trim_end_matches('/');
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}
