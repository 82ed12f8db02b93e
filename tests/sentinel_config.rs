use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crash_sentinel::config::{ConfigOverrides, SentinelConfig};
use crash_sentinel::SentinelError;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CRASH_SENTINEL_CONFIG",
        "CRASH_SENTINEL_OUTPUT_ROOT",
        "CRASH_SENTINEL_CONFIDENCE",
        "CRASH_SENTINEL_CONSECUTIVE_FRAMES",
        "CRASH_SENTINEL_MAX_CAPTURES",
        "CRASH_SENTINEL_MUTED",
        "CRASH_SENTINEL_TARGET_LABEL",
        "CRASH_SENTINEL_SMS_API_KEY",
        "CRASH_SENTINEL_SMTP_PASSWORD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "output_root": "/var/lib/crash-sentinel",
        "target_label": "collision",
        "detection": {
            "confidence_threshold": 0.6,
            "consecutive_frames_required": 4
        },
        "capture": { "max_captures_per_session": 3, "jpeg_quality": 80 },
        "alarm": { "muted": false, "command": ["aplay", "alarm.wav"] },
        "notify": {
            "queue_capacity": 2,
            "max_attachments": 3,
            "sms": {
                "gateway_url": "https://sms.example/send",
                "api_key": "from-file",
                "recipients": ["+15550100", "+15550101"]
            }
        },
        "pacing": { "default_interval_ms": 40 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CRASH_SENTINEL_CONFIG", file.path());
    std::env::set_var("CRASH_SENTINEL_CONSECUTIVE_FRAMES", "5");
    std::env::set_var("CRASH_SENTINEL_MUTED", "yes");
    std::env::set_var("CRASH_SENTINEL_SMS_API_KEY", "from-env");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.output_root, PathBuf::from("/var/lib/crash-sentinel"));
    assert_eq!(cfg.target_label, "collision");
    assert_eq!(cfg.detection.confidence_threshold, 0.6);
    assert_eq!(cfg.detection.consecutive_frames_required, 5);
    assert_eq!(cfg.capture.max_captures_per_session, 3);
    assert_eq!(cfg.capture.jpeg_quality, 80);
    assert!(cfg.alarm.muted);
    assert_eq!(
        cfg.alarm.command,
        Some(vec!["aplay".to_string(), "alarm.wav".to_string()])
    );
    assert_eq!(cfg.notify.queue_capacity, 2);
    assert_eq!(cfg.notify.max_attachments, 3);
    let sms = cfg.notify.sms.as_ref().expect("sms settings");
    assert_eq!(sms.api_key, "from-env");
    assert_eq!(sms.recipients.len(), 2);
    assert_eq!(cfg.default_interval_ms, 40.0);

    let session = cfg.session_settings("clips/crash.mp4");
    assert_eq!(session.capture_limit, 3);
    assert_eq!(session.consecutive_frames, 5);
    assert_eq!(session.matcher.target(), "collision");
    assert_eq!(session.output_root, PathBuf::from("/var/lib/crash-sentinel"));

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load defaults");
    assert_eq!(cfg.output_root, PathBuf::from("accident_frames"));
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.consecutive_frames_required, 3);
    assert_eq!(cfg.capture.max_captures_per_session, 5);
    assert!(!cfg.alarm.muted);
    assert_eq!(cfg.build_notifiers().unwrap().len(), 1);
}

#[test]
fn invalid_values_are_config_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CRASH_SENTINEL_CONFIDENCE", "1.2");
    let err = SentinelConfig::load().unwrap_err();
    assert!(matches!(err, SentinelError::Config(_)));
    assert!(err.is_fatal());

    std::env::set_var("CRASH_SENTINEL_CONFIDENCE", "high");
    assert!(matches!(
        SentinelConfig::load().unwrap_err(),
        SentinelError::Config(_)
    ));

    clear_env();
    std::env::set_var("CRASH_SENTINEL_CONFIG", "/definitely/missing/sentinel.json");
    assert!(SentinelConfig::load().is_err());

    clear_env();
}

#[test]
fn command_line_overrides_are_validated() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let base = SentinelConfig::load().expect("load defaults");

    let cfg = base
        .clone()
        .with_overrides(&ConfigOverrides {
            output_root: Some(PathBuf::from("/tmp/evidence")),
            confidence_threshold: Some(0.8),
            consecutive_frames_required: Some(2),
            max_captures_per_session: Some(1),
            muted: true,
        })
        .expect("valid overrides");
    assert_eq!(cfg.output_root, PathBuf::from("/tmp/evidence"));
    assert_eq!(cfg.detection.confidence_threshold, 0.8);
    assert_eq!(cfg.detection.consecutive_frames_required, 2);
    assert_eq!(cfg.capture.max_captures_per_session, 1);
    assert!(cfg.alarm.muted);

    for bad in [
        ConfigOverrides {
            confidence_threshold: Some(1.5),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            confidence_threshold: Some(f32::NAN),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            consecutive_frames_required: Some(0),
            ..ConfigOverrides::default()
        },
    ] {
        let err = base.clone().with_overrides(&bad).unwrap_err();
        assert!(matches!(err, SentinelError::Config(_)), "{:?}", bad);
    }
}

#[test]
fn smtp_password_comes_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[notify.email]
smtp_host = "smtp.example.com"
smtp_port = 587
starttls = true
username = "sentinel"
from = "Crash Sentinel <sentinel@example.com>"
recipients = ["ops@example.com"]
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("CRASH_SENTINEL_CONFIG", file.path());
    std::env::set_var("CRASH_SENTINEL_SMTP_PASSWORD", "from-env");

    let cfg = SentinelConfig::load().expect("load config");
    let email = cfg.notify.email.as_ref().expect("email settings");
    assert_eq!(email.smtp_port, 587);
    assert!(email.starttls);
    assert_eq!(email.password.as_deref(), Some("from-env"));

    clear_env();
}
