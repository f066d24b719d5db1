use super::*;
use serde_json::json;

fn parse(payload: &str) -> Result<PartialState, EngineError> {
    parse_payload(payload.as_bytes(), &FieldNormalizer::default())
}

#[test]
fn test_parse_flat_object() {
    let partial = parse(r#"{"motor_on": true, "battery_level": 80, "vibration": 1.25}"#).unwrap();

    assert_eq!(partial.len(), 3);
    assert_eq!(partial.get("motor_on").unwrap(), &json!(true));
    assert_eq!(partial.get("battery_level").unwrap(), &json!(80));
    assert_eq!(partial.get("vibration").unwrap(), &json!(1.25));
}

#[test]
fn test_unknown_fields_are_preserved() {
    let partial = parse(r#"{"firmware": "2.1.0", "extra": {"nested": [1, 2]}}"#).unwrap();

    assert_eq!(partial.get("firmware").unwrap(), &json!("2.1.0"));
    assert_eq!(partial.get("extra").unwrap(), &json!({"nested": [1, 2]}));
}

#[test]
fn test_camel_case_fields_are_normalized() {
    let partial = parse(
        r#"{"conveyorCount": 3, "energyConsumption": 12.5, "inputSensorStatus": "ok"}"#,
    )
    .unwrap();

    let names: Vec<&str> = partial.field_names().collect();
    assert_eq!(
        names,
        vec!["conveyor_count", "energy_consumption", "input_sensor_status"]
    );
}

#[test]
fn test_status_alias_maps_to_motor_status() {
    let partial = parse(r#"{"status": "running"}"#).unwrap();
    assert_eq!(partial.get("motor_status").unwrap(), &json!("running"));
    assert!(partial.get("status").is_none());
}

#[test]
fn test_motor_status_wins_over_status_alias() {
    for payload in [
        r#"{"status": "a", "motor_status": "b"}"#,
        r#"{"motor_status": "b", "status": "a"}"#,
    ] {
        let partial = parse(payload).unwrap();
        assert_eq!(partial.len(), 1, "{}", payload);
        assert_eq!(partial.get("motor_status").unwrap(), &json!("b"), "{}", payload);
    }
}

#[test]
fn test_canonical_key_wins_over_variant() {
    let partial = parse(r#"{"conveyorCount": 1, "conveyor_count": 2}"#).unwrap();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial.get("conveyor_count").unwrap(), &json!(2));

    // Order in the payload does not matter
    let partial = parse(r#"{"conveyor_count": 2, "conveyorCount": 1}"#).unwrap();
    assert_eq!(partial.get("conveyor_count").unwrap(), &json!(2));
}

#[test]
fn test_nested_keys_are_not_rewritten() {
    let partial = parse(r#"{"meta": {"innerKey": 1}}"#).unwrap();
    assert_eq!(partial.get("meta").unwrap(), &json!({"innerKey": 1}));
}

#[test]
fn test_null_values_are_kept() {
    let partial = parse(r#"{"temperature": null}"#).unwrap();
    assert_eq!(partial.get("temperature").unwrap(), &json!(null));
}

#[test]
fn test_invalid_json_is_parse_error() {
    assert!(matches!(parse("{not json"), Err(EngineError::MessageParse(_))));
    assert!(matches!(parse(""), Err(EngineError::MessageParse(_))));
}

#[test]
fn test_non_object_payloads_are_rejected() {
    for payload in ["[1, 2]", "42", "\"motor_on\"", "null", "true"] {
        match parse(payload) {
            Err(EngineError::MessageParse(msg)) => assert!(msg.contains("expected a JSON object")),
            other => panic!("expected parse error for {payload}, got {other:?}"),
        }
    }
}

#[test]
fn test_invalid_utf8_is_parse_error() {
    let result = parse_payload(&[0xff, 0xfe, b'{'], &FieldNormalizer::default());
    assert!(matches!(result, Err(EngineError::MessageParse(_))));
}

#[test]
fn test_custom_alias() {
    let normalizer = FieldNormalizer::new().with_alias("batt", "battery_level");
    let partial = parse_payload(br#"{"batt": 55}"#, &normalizer).unwrap();
    assert_eq!(partial.get("battery_level").unwrap(), &json!(55));
}

#[cfg(test)]
mod snake_case_tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("conveyorCount"), "conveyor_count");
        assert_eq!(to_snake_case("positionInSequence"), "position_in_sequence");
        assert_eq!(to_snake_case("motorRPM"), "motor_rpm");
        assert_eq!(to_snake_case("RPMValue"), "rpm_value");
        assert_eq!(to_snake_case("battery_level"), "battery_level");
        assert_eq!(to_snake_case("load-level"), "load_level");
        assert_eq!(to_snake_case("sensor2Status"), "sensor2_status");
        assert_eq!(to_snake_case("Temperature"), "temperature");
    }
}
