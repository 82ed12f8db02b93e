use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capture::{CaptureSettings, DEFAULT_JPEG_QUALITY, DEFAULT_LABEL_TEXT};
use crate::debounce::DEFAULT_CONSECUTIVE_FRAMES;
use crate::detect::TargetMatcher;
use crate::episode::DEFAULT_CAPTURE_LIMIT;
use crate::error::SentinelError;
use crate::notify::alarm::{AlarmSink, CommandAlarm, TerminalBell};
use crate::notify::email::DEFAULT_SMTP_PORT;
use crate::notify::mqtt::{DEFAULT_CLIENT_ID, DEFAULT_TOPIC_PREFIX};
use crate::notify::{
    EmailNotifier, EmailSettings, LogNotifier, MqttNotifier, MqttSettings, Notifier, SmsNotifier,
    SmsSettings, DEFAULT_QUEUE_CAPACITY, MAX_ATTACHMENTS,
};
use crate::pacing::{PacingController, DEFAULT_FRAME_INTERVAL_MS};
use crate::session::SessionSettings;

const DEFAULT_OUTPUT_ROOT: &str = "accident_frames";
const DEFAULT_TARGET_LABEL: &str = "accident";
const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    output_root: Option<PathBuf>,
    target_label: Option<String>,
    detection: Option<DetectionConfigFile>,
    capture: Option<CaptureConfigFile>,
    alarm: Option<AlarmConfigFile>,
    notify: Option<NotifyConfigFile>,
    pacing: Option<PacingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    consecutive_frames_required: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    max_captures_per_session: Option<u32>,
    annotate: Option<bool>,
    label_text: Option<String>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct AlarmConfigFile {
    muted: Option<bool>,
    command: Option<Vec<String>>,
    tone: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    queue_capacity: Option<usize>,
    max_attachments: Option<usize>,
    email: Option<EmailConfigFile>,
    mqtt: Option<MqttConfigFile>,
    sms: Option<SmsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct EmailConfigFile {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    starttls: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    recipients: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    topic_prefix: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SmsConfigFile {
    gateway_url: Option<String>,
    api_key: Option<String>,
    recipients: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct PacingConfigFile {
    default_interval_ms: Option<f64>,
}

/// Values set on the command line, applied over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_root: Option<PathBuf>,
    pub confidence_threshold: Option<f32>,
    pub consecutive_frames_required: Option<u32>,
    pub max_captures_per_session: Option<u32>,
    pub muted: bool,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub output_root: PathBuf,
    pub target_label: String,
    pub detection: DetectionSettings,
    pub capture: CaptureConfig,
    pub alarm: AlarmConfig,
    pub notify: NotifyConfig,
    pub default_interval_ms: f64,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub consecutive_frames_required: u32,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub max_captures_per_session: u32,
    pub annotate: bool,
    pub label_text: String,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct AlarmConfig {
    pub muted: bool,
    pub command: Option<Vec<String>>,
    /// Synthesized tone on the audio device (`alarm-tone` feature).
    pub tone: bool,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub queue_capacity: usize,
    pub max_attachments: usize,
    pub email: Option<EmailSettings>,
    pub mqtt: Option<MqttSettings>,
    pub sms: Option<SmsSettings>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            target_label: DEFAULT_TARGET_LABEL.to_string(),
            detection: DetectionSettings {
                confidence_threshold: DEFAULT_CONFIDENCE,
                consecutive_frames_required: DEFAULT_CONSECUTIVE_FRAMES,
            },
            capture: CaptureConfig {
                max_captures_per_session: DEFAULT_CAPTURE_LIMIT,
                annotate: true,
                label_text: DEFAULT_LABEL_TEXT.to_string(),
                jpeg_quality: DEFAULT_JPEG_QUALITY,
            },
            alarm: AlarmConfig {
                muted: false,
                command: None,
                tone: false,
            },
            notify: NotifyConfig {
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                max_attachments: MAX_ATTACHMENTS,
                email: None,
                mqtt: None,
                sms: None,
            },
            default_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

impl SentinelConfig {
    /// Defaults, then `CRASH_SENTINEL_CONFIG` (JSON or TOML), then env overrides.
    pub fn load() -> Result<Self, SentinelError> {
        Self::load_inner().map_err(|e| SentinelError::Config(format!("{:#}", e)))
    }

    fn load_inner() -> Result<Self> {
        let config_path = std::env::var("CRASH_SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Re-check the configuration after it was changed in code, e.g. by
    /// command-line overrides.
    pub fn validate(&mut self) -> Result<(), SentinelError> {
        self.check()
            .map_err(|e| SentinelError::Config(format!("{:#}", e)))
    }

    /// Apply `overrides` and validate the result.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, SentinelError> {
        if let Some(root) = &overrides.output_root {
            self.output_root = root.clone();
        }
        if let Some(confidence) = overrides.confidence_threshold {
            self.detection.confidence_threshold = confidence;
        }
        if let Some(frames) = overrides.consecutive_frames_required {
            self.detection.consecutive_frames_required = frames;
        }
        if let Some(max) = overrides.max_captures_per_session {
            self.capture.max_captures_per_session = max;
        }
        if overrides.muted {
            self.alarm.muted = true;
        }
        self.validate()?;
        Ok(self)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let detection = file.detection.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let alarm = file.alarm.unwrap_or_default();
        let notify = file.notify.unwrap_or_default();

        let email = match notify.email {
            Some(email) => Some(EmailSettings {
                smtp_host: email
                    .smtp_host
                    .ok_or_else(|| anyhow!("notify.email.smtp_host is required"))?,
                smtp_port: email.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
                starttls: email.starttls.unwrap_or(false),
                username: email.username,
                password: email.password,
                from: email
                    .from
                    .ok_or_else(|| anyhow!("notify.email.from is required"))?,
                recipients: email.recipients.unwrap_or_default(),
            }),
            None => None,
        };
        let mqtt = match notify.mqtt {
            Some(mqtt) => {
                let broker_addr = mqtt
                    .broker_addr
                    .ok_or_else(|| anyhow!("notify.mqtt.broker_addr is required"))?;
                Some(MqttSettings {
                    broker_addr,
                    topic_prefix: mqtt
                        .topic_prefix
                        .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
                    client_id: mqtt
                        .client_id
                        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                    username: mqtt.username,
                    password: mqtt.password,
                })
            }
            None => None,
        };
        let sms = match notify.sms {
            Some(sms) => Some(SmsSettings {
                gateway_url: sms
                    .gateway_url
                    .ok_or_else(|| anyhow!("notify.sms.gateway_url is required"))?,
                api_key: sms.api_key.unwrap_or_default(),
                recipients: sms.recipients.unwrap_or_default(),
            }),
            None => None,
        };

        let defaults = Self::default();
        Ok(Self {
            output_root: file.output_root.unwrap_or(defaults.output_root),
            target_label: file.target_label.unwrap_or(defaults.target_label),
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(defaults.detection.confidence_threshold),
                consecutive_frames_required: detection
                    .consecutive_frames_required
                    .unwrap_or(defaults.detection.consecutive_frames_required),
            },
            capture: CaptureConfig {
                max_captures_per_session: capture
                    .max_captures_per_session
                    .unwrap_or(defaults.capture.max_captures_per_session),
                annotate: capture.annotate.unwrap_or(defaults.capture.annotate),
                label_text: capture.label_text.unwrap_or(defaults.capture.label_text),
                jpeg_quality: capture
                    .jpeg_quality
                    .unwrap_or(defaults.capture.jpeg_quality),
            },
            alarm: AlarmConfig {
                muted: alarm.muted.unwrap_or(defaults.alarm.muted),
                command: alarm.command,
                tone: alarm.tone.unwrap_or(defaults.alarm.tone),
            },
            notify: NotifyConfig {
                queue_capacity: notify
                    .queue_capacity
                    .unwrap_or(defaults.notify.queue_capacity),
                max_attachments: notify
                    .max_attachments
                    .unwrap_or(defaults.notify.max_attachments),
                email,
                mqtt,
                sms,
            },
            default_interval_ms: file
                .pacing
                .and_then(|pacing| pacing.default_interval_ms)
                .unwrap_or(defaults.default_interval_ms),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("CRASH_SENTINEL_OUTPUT_ROOT") {
            if !root.trim().is_empty() {
                self.output_root = PathBuf::from(root);
            }
        }
        if let Ok(label) = std::env::var("CRASH_SENTINEL_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.target_label = label;
            }
        }
        if let Ok(confidence) = std::env::var("CRASH_SENTINEL_CONFIDENCE") {
            self.detection.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("CRASH_SENTINEL_CONFIDENCE must be a number"))?;
        }
        if let Ok(frames) = std::env::var("CRASH_SENTINEL_CONSECUTIVE_FRAMES") {
            self.detection.consecutive_frames_required = frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("CRASH_SENTINEL_CONSECUTIVE_FRAMES must be an integer"))?;
        }
        if let Ok(captures) = std::env::var("CRASH_SENTINEL_MAX_CAPTURES") {
            self.capture.max_captures_per_session = captures
                .trim()
                .parse()
                .map_err(|_| anyhow!("CRASH_SENTINEL_MAX_CAPTURES must be an integer"))?;
        }
        if let Ok(muted) = std::env::var("CRASH_SENTINEL_MUTED") {
            self.alarm.muted = parse_flag(&muted)
                .ok_or_else(|| anyhow!("CRASH_SENTINEL_MUTED must be true/false"))?;
        }
        if let Ok(password) = std::env::var("CRASH_SENTINEL_SMTP_PASSWORD") {
            if !password.is_empty() {
                if let Some(email) = self.notify.email.as_mut() {
                    email.password = Some(password);
                }
            }
        }
        if let Ok(key) = std::env::var("CRASH_SENTINEL_SMS_API_KEY") {
            if !key.trim().is_empty() {
                if let Some(sms) = self.notify.sms.as_mut() {
                    sms.api_key = key;
                }
            }
        }
        Ok(())
    }

    fn check(&mut self) -> Result<()> {
        let confidence = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                confidence
            ));
        }
        if self.detection.consecutive_frames_required == 0 {
            return Err(anyhow!("consecutive frames required must be at least 1"));
        }
        self.target_label = self.target_label.trim().to_string();
        if self.target_label.is_empty() {
            return Err(anyhow!("target label must not be empty"));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if self.notify.queue_capacity == 0 {
            return Err(anyhow!("notification queue capacity must be at least 1"));
        }
        if self.notify.max_attachments > MAX_ATTACHMENTS {
            return Err(anyhow!(
                "at most {} attachments per alert, got {}",
                MAX_ATTACHMENTS,
                self.notify.max_attachments
            ));
        }
        if let Some(command) = &self.alarm.command {
            if command.is_empty() {
                return Err(anyhow!("alarm command must not be empty"));
            }
        }
        if !(self.default_interval_ms.is_finite() && self.default_interval_ms > 0.0) {
            return Err(anyhow!("default frame interval must be positive"));
        }
        if self.alarm.tone && self.alarm.command.is_some() {
            return Err(anyhow!("alarm.tone and alarm.command are mutually exclusive"));
        }
        if let Some(email) = &self.notify.email {
            if email.recipients.is_empty() {
                return Err(anyhow!("notify.email.recipients must list at least one address"));
            }
        }
        if let Some(sms) = &self.notify.sms {
            if sms.recipients.is_empty() {
                return Err(anyhow!("notify.sms.recipients must list at least one number"));
            }
        }
        Ok(())
    }

    pub fn matcher(&self) -> TargetMatcher {
        TargetMatcher::new(&self.target_label, self.detection.confidence_threshold)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            annotate: self.capture.annotate,
            label_text: self.capture.label_text.clone(),
            jpeg_quality: self.capture.jpeg_quality,
        }
    }

    /// Session settings for `source_ref` using this configuration.
    pub fn session_settings(&self, source_ref: &str) -> SessionSettings {
        let mut settings = SessionSettings::new(source_ref, &self.output_root);
        settings.matcher = self.matcher();
        settings.consecutive_frames = self.detection.consecutive_frames_required;
        settings.capture_limit = self.capture.max_captures_per_session;
        settings.capture = self.capture_settings();
        settings.pacing = PacingController::new(self.default_interval_ms);
        settings
    }

    /// Configured alert channels, or the log channel when none are set.
    pub fn build_notifiers(&self) -> Result<Vec<Box<dyn Notifier>>> {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(email) = &self.notify.email {
            notifiers.push(Box::new(
                EmailNotifier::new(email.clone()).context("configure email alerts")?,
            ));
        }
        if let Some(mqtt) = &self.notify.mqtt {
            notifiers.push(Box::new(
                MqttNotifier::connect(mqtt.clone()).context("configure MQTT alerts")?,
            ));
        }
        if let Some(sms) = &self.notify.sms {
            notifiers.push(Box::new(
                SmsNotifier::new(sms.clone()).context("configure SMS alerts")?,
            ));
        }
        if notifiers.is_empty() {
            notifiers.push(Box::new(LogNotifier));
        }
        Ok(notifiers)
    }

    /// The configured player command or tone, else the terminal bell.
    pub fn build_alarm(&self) -> Result<Arc<dyn AlarmSink>> {
        if let Some(command) = &self.alarm.command {
            return Ok(Arc::new(CommandAlarm::new(command)?));
        }
        if self.alarm.tone {
            return build_tone_alarm();
        }
        Ok(Arc::new(TerminalBell))
    }
}

#[cfg(feature = "alarm-tone")]
fn build_tone_alarm() -> Result<Arc<dyn AlarmSink>> {
    use crate::notify::tone::{ToneAlarm, DEFAULT_TONE_DURATION, DEFAULT_TONE_HZ};
    Ok(Arc::new(ToneAlarm::new(DEFAULT_TONE_HZ, DEFAULT_TONE_DURATION)?))
}

#[cfg(not(feature = "alarm-tone"))]
fn build_tone_alarm() -> Result<Arc<dyn AlarmSink>> {
    Err(anyhow!(
        "alarm.tone requires building with --features alarm-tone"
    ))
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.output_root, PathBuf::from("accident_frames"));
        assert_eq!(cfg.target_label, "accident");
        assert_eq!(cfg.detection.confidence_threshold, 0.5);
        assert_eq!(cfg.detection.consecutive_frames_required, 3);
        assert_eq!(cfg.capture.max_captures_per_session, 5);
        assert!(!cfg.alarm.muted);
        assert_eq!(cfg.default_interval_ms, 30.0);
        assert!(cfg.notify.mqtt.is_none());
        assert!(cfg.notify.sms.is_none());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut cfg = SentinelConfig::default();
        cfg.detection.confidence_threshold = 1.5;
        assert!(cfg.check().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.detection.consecutive_frames_required = 0;
        assert!(cfg.check().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.target_label = "  ".to_string();
        assert!(cfg.check().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.notify.max_attachments = 6;
        assert!(cfg.check().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.capture.jpeg_quality = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn toml_files_are_parsed_by_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sentinel.toml");
        std::fs::write(
            &path,
            r#"
target_label = "collision"

[detection]
confidence_threshold = 0.7

[notify.mqtt]
broker_addr = "127.0.0.1:1883"
"#,
        )?;
        let cfg = SentinelConfig::from_file(read_config_file(&path)?)?;
        assert_eq!(cfg.target_label, "collision");
        assert_eq!(cfg.detection.confidence_threshold, 0.7);
        let mqtt = cfg.notify.mqtt.expect("mqtt section");
        assert_eq!(mqtt.topic_prefix, "crash_sentinel");
        Ok(())
    }

    #[test]
    fn email_section_is_parsed() -> Result<()> {
        let file: SentinelConfigFile = serde_json::from_str(
            r#"{"notify": {"email": {
                "smtp_host": "smtp.example.com",
                "username": "sentinel",
                "from": "sentinel@example.com",
                "recipients": ["ops@example.com"]
            }}}"#,
        )?;
        let mut cfg = SentinelConfig::from_file(file)?;
        cfg.check()?;
        let email = cfg.notify.email.clone().expect("email section");
        assert_eq!(email.smtp_port, 465);
        assert!(!email.starttls);
        assert_eq!(email.recipients, vec!["ops@example.com"]);
        assert_eq!(cfg.build_notifiers()?[0].channel(), "email");

        if let Some(email) = cfg.notify.email.as_mut() {
            email.recipients.clear();
        }
        assert!(cfg.check().is_err());
        Ok(())
    }

    #[test]
    fn email_section_requires_host_and_sender() {
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"notify": {"email": {"from": "a@example.com"}}}"#).unwrap();
        assert!(SentinelConfig::from_file(file).is_err());
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"notify": {"email": {"smtp_host": "smtp"}}}"#).unwrap();
        assert!(SentinelConfig::from_file(file).is_err());
    }

    #[test]
    fn sms_section_requires_gateway() {
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"notify": {"sms": {"recipients": ["+15550100"]}}}"#).unwrap();
        assert!(SentinelConfig::from_file(file).is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(split_csv(" a, ,b "), vec!["a", "b"]);
    }
}
