use super::*;

#[test]
fn defaults_validate() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.default_producer_length, 15000);
    assert_eq!(cfg.cache_size, 10);
    cfg.validate().unwrap();
}

#[test]
fn oversize_cache_is_rejected() {
    let cfg = EngineConfig {
        cache_size: MAX_CACHE_SIZE + 1,
        ..EngineConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
}

#[test]
fn config_deserializes_partial_json() {
    let cfg: EngineConfig = serde_json::from_str(r#"{"default_producer_length": 250}"#).unwrap();
    assert_eq!(cfg.default_producer_length, 250);
    assert_eq!(cfg.cache_size, DEFAULT_CACHE_SIZE);
}

#[test]
fn unset_engine_uses_default_profile() {
    assert_eq!(default_profile().width, config().profile.width);
}
