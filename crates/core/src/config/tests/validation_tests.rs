use crate::config::models::AppConfig;

#[test]
fn test_heartbeat_longer_than_half_lease_rejected() {
    let toml_content = r#"
[service]
name = "svc"
lease_seconds = 30
heartbeat_seconds = 16
"#;
    let err = AppConfig::from_toml(toml_content).unwrap_err();
    assert!(format!("{err:#}").contains("心跳间隔"));
}

#[test]
fn test_service_name_validation() {
    let mut config = AppConfig::default();
    config.service.name = "".to_string();
    assert!(config.validate().is_err());

    config.service.name = "has space".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_rabbitmq_url_must_be_amqp() {
    let mut config = AppConfig::default();
    config.message_queue.url = "http://localhost".to_string();
    assert!(config.validate().is_err());

    config.message_queue.r#type = crate::config::models::MessageQueueType::InMemory;
    assert!(config.validate().is_ok());
}

#[test]
fn test_redis_validation_skipped_when_disabled() {
    let mut config = AppConfig::default();
    config.redis.port = 0;
    assert!(config.validate().is_err());

    config.redis.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_poll_period_must_be_below_one_minute() {
    let mut config = AppConfig::default();
    config.scheduler.specific_time_poll_seconds = 60;
    assert!(config.validate().is_err());

    config.scheduler.specific_time_poll_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_observability_validation() {
    let mut config = AppConfig::default();
    config.observability.log_format = "xml".to_string();
    assert!(config.validate().is_err());

    config.observability.log_format = "json".to_string();
    config.observability.metrics_enabled = true;
    config.observability.metrics_bind_address = "not-an-addr".to_string();
    assert!(config.validate().is_err());
}
