use linkchat_sync::{ChatConfig, ChatError};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn default_api_base_url() {
    let config = ChatConfig::default();
    assert_eq!(config.api_base_url, "http://127.0.0.1:5000");
}

#[test]
fn default_poll_interval() {
    let config = ChatConfig::default();
    assert_eq!(config.poll_interval_ms, 3000);
    assert_eq!(config.poll_interval(), Duration::from_secs(3));
}

#[test]
fn default_request_timeout() {
    let config = ChatConfig::default();
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
}

#[test]
fn default_upload_refresh_delay() {
    let config = ChatConfig::default();
    assert_eq!(config.upload_refresh_delay(), Duration::from_millis(500));
}

#[test]
fn default_names_path_is_unset() {
    let config = ChatConfig::default();
    assert!(config.names_path.is_none());
}

#[test]
fn serialization_roundtrip() {
    let config = ChatConfig {
        api_base_url: "http://10.0.0.2:5000".into(),
        local_device_id: "aa:bb:cc:dd:ee:ff".into(),
        poll_interval_ms: 1500,
        request_timeout_secs: 10,
        upload_refresh_delay_ms: 250,
        names_path: Some(PathBuf::from("/tmp/names.json")),
    };
    let json = serde_json::to_string(&config).unwrap();
    let parsed: ChatConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.api_base_url, "http://10.0.0.2:5000");
    assert_eq!(parsed.local_device_id, "aa:bb:cc:dd:ee:ff");
    assert_eq!(parsed.poll_interval_ms, 1500);
    assert_eq!(parsed.request_timeout_secs, 10);
    assert_eq!(parsed.upload_refresh_delay_ms, 250);
    assert_eq!(parsed.names_path, Some(PathBuf::from("/tmp/names.json")));
}

#[test]
fn names_path_may_be_omitted() {
    let json = r#"{
        "api_base_url": "http://127.0.0.1:5000",
        "local_device_id": "me",
        "poll_interval_ms": 3000,
        "request_timeout_secs": 30,
        "upload_refresh_delay_ms": 500
    }"#;
    let parsed: ChatConfig = serde_json::from_str(json).unwrap();
    assert!(parsed.names_path.is_none());
}

#[test]
fn default_config_is_valid() {
    assert!(ChatConfig::default().validate().is_ok());
}

#[test]
fn empty_base_url_is_rejected() {
    let config = ChatConfig {
        api_base_url: "  ".into(),
        ..ChatConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ChatError::Config(_)));
    assert_eq!(err.to_string(), "invalid configuration: missing api_base_url");
}

#[test]
fn zero_poll_interval_is_rejected() {
    let config = ChatConfig {
        poll_interval_ms: 0,
        ..ChatConfig::default()
    };
    assert!(matches!(config.validate(), Err(ChatError::Config(_))));
}

#[test]
fn clone_preserves_fields() {
    let config = ChatConfig::default();
    let cloned = config.clone();
    assert_eq!(config.api_base_url, cloned.api_base_url);
    assert_eq!(config.local_device_id, cloned.local_device_id);
}
