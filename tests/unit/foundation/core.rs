use super::*;

#[test]
fn service_ids_are_unique_and_increasing() {
    let a = ServiceId::next();
    let b = ServiceId::next();
    assert!(b > a);
    assert_ne!(a, b);
}

#[test]
fn eof_policy_parses_known_values() {
    assert_eq!(EofPolicy::parse(Some("pause")), Some(EofPolicy::Pause));
    assert_eq!(EofPolicy::parse(Some("loop")), Some(EofPolicy::Loop));
    assert_eq!(EofPolicy::parse(Some("continue")), Some(EofPolicy::Continue));
    assert_eq!(EofPolicy::parse(Some("rewind")), None);
    assert_eq!(EofPolicy::parse(None), None);
    assert_eq!(EofPolicy::Loop.as_str(), "loop");
}

#[test]
fn modality_bits_match_hide_mask() {
    assert_eq!(Modality::Video.bit(), HIDE_VIDEO);
    assert_eq!(Modality::Audio.bit(), HIDE_AUDIO);
    assert_eq!(Modality::from_bits(2), Some(Modality::Audio));
    assert_eq!(Modality::from_bits(3), None);
}

#[test]
fn eof_policy_serde_is_snake_case() {
    let s = serde_json::to_string(&EofPolicy::Continue).unwrap();
    assert_eq!(s, "\"continue\"");
    let p: EofPolicy = serde_json::from_str("\"loop\"").unwrap();
    assert_eq!(p, EofPolicy::Loop);
}
