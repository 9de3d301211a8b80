use simlink::protocol::*;
use simlink::record::*;

const VALID_STATE: &str = r#"{"temperatura_actual":21.5,"temperatura_deseada":23.0,"modo_climatizador":"calentando","falla_sensor":false,"bateria_baja":true,"encendido":true,"modo_display":"ambiente","timestamp":"2024-05-01T12:30:00.500"}"#;

fn state_without(field: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(VALID_STATE).unwrap();
    value.as_object_mut().unwrap().remove(field);
    value.to_string()
}

fn state_with(field: &str, replacement: serde_json::Value) -> String {
    let mut value: serde_json::Value = serde_json::from_str(VALID_STATE).unwrap();
    value[field] = replacement;
    value.to_string()
}

#[test]
fn test_decode_valid_state() {
    let record = decode_state(VALID_STATE).unwrap();
    let state = record.value();

    assert_eq!(state.current_temp, 21.5);
    assert_eq!(state.desired_temp, 23.0);
    assert_eq!(state.climatizer_mode, ClimatizerMode::Heating);
    assert!(!state.sensor_fault);
    assert!(state.low_battery);
    assert!(state.powered);
    assert_eq!(state.display_mode, DisplayMode::Ambient);
    assert_eq!(format_timestamp(record.timestamp()), "2024-05-01T12:30:00.500Z");
}

#[test]
fn test_decode_tolerates_surrounding_whitespace() {
    let padded = format!("  \t{}  \r\n", VALID_STATE);
    assert!(decode_state(&padded).is_ok());
}

#[test]
fn test_missing_climatizer_mode() {
    let err = decode_state(&state_without("modo_climatizador")).unwrap_err();
    assert_eq!(err, CodecError::MissingField("modo_climatizador"));
    assert_eq!(err.kind(), CodecErrorKind::MissingField);
}

#[test]
fn test_every_field_is_required() {
    for field in STATE_FIELDS {
        let err = decode_state(&state_without(field)).unwrap_err();
        assert_eq!(err, CodecError::MissingField(field), "field {}", field);
    }
}

#[test]
fn test_unknown_climatizer_mode() {
    let err = decode_state(&state_with("modo_climatizador", "bogus".into())).unwrap_err();
    assert_eq!(err.kind(), CodecErrorKind::InvalidEnumValue);
    assert!(err.to_string().contains("bogus"));
}

#[test]
fn test_unknown_display_mode() {
    let err = decode_state(&state_with("modo_display", "desired".into())).unwrap_err();
    assert!(matches!(
        err,
        CodecError::InvalidEnumValue { field: "modo_display", .. }
    ));
}

#[test]
fn test_sanity_bound_on_current_temperature() {
    let hot = decode_state(&state_with("temperatura_actual", 85.5.into())).unwrap_err();
    assert_eq!(hot.kind(), CodecErrorKind::OutOfSanityBound);

    let cold = decode_state(&state_with("temperatura_actual", (-40.1).into())).unwrap_err();
    assert_eq!(cold.kind(), CodecErrorKind::OutOfSanityBound);

    assert!(decode_state(&state_with("temperatura_actual", 85.0.into())).is_ok());
    assert!(decode_state(&state_with("temperatura_actual", (-40.0).into())).is_ok());
}

#[test]
fn test_malformed_json() {
    let truncated = &VALID_STATE[..VALID_STATE.len() - 1];
    assert_eq!(
        decode_state(truncated).unwrap_err().kind(),
        CodecErrorKind::MalformedMessage
    );
    assert_eq!(
        decode_state("[1, 2, 3]").unwrap_err().kind(),
        CodecErrorKind::MalformedMessage
    );
    assert_eq!(decode_state("").unwrap_err().kind(), CodecErrorKind::MalformedMessage);
}

#[test]
fn test_wrong_field_types() {
    let err = decode_state(&state_with("temperatura_actual", "21.5".into())).unwrap_err();
    assert_eq!(
        err,
        CodecError::InvalidFieldType {
            field: "temperatura_actual",
            expected: "a number"
        }
    );

    let err = decode_state(&state_with("encendido", 1.into())).unwrap_err();
    assert_eq!(err.kind(), CodecErrorKind::InvalidFieldType);
}

#[test]
fn test_invalid_timestamp() {
    let err = decode_state(&state_with("timestamp", "not a time".into())).unwrap_err();
    assert_eq!(err.kind(), CodecErrorKind::InvalidTimestamp);
}

#[test]
fn test_state_encoding_decodes_back() {
    let record = decode_state(VALID_STATE).unwrap();
    let line = encode_state(&record);

    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
    assert_eq!(decode_state(&line).unwrap(), record);
}

#[test]
fn test_power_command_encoding() {
    let line = encode_command(&Command::power(true));
    assert!(line.ends_with('\n'));
    assert!(line.contains(r#""comando":"power""#));
    assert!(line.contains(r#""estado":"on""#));

    let off = encode_command(&Command::power(false));
    assert!(off.contains(r#""estado":"off""#));
}

#[test]
fn test_command_lines_carry_all_fields() {
    let setpoint = Command::set_desired_temp(21.5).unwrap();
    let json: serde_json::Value = serde_json::from_str(&encode_command(&setpoint)).unwrap();
    assert_eq!(json["comando"], "set_temp_deseada");
    assert_eq!(json["valor"], 21.5);
    assert_eq!(
        parse_timestamp(json["timestamp"].as_str().unwrap()).unwrap(),
        parse_timestamp(&format_timestamp(setpoint.timestamp())).unwrap()
    );

    let display = Command::set_display_mode(DisplayMode::Desired);
    let json: serde_json::Value = serde_json::from_str(&encode_command(&display)).unwrap();
    assert_eq!(json["comando"], "set_modo_display");
    assert_eq!(json["modo"], "deseada");
    assert!(json["timestamp"].is_string());
}

#[test]
fn test_setpoint_rejected_at_construction() {
    assert!(matches!(
        Command::set_desired_temp(35.5),
        Err(CommandError::SetpointOutOfRange { value, .. }) if value == 35.5
    ));
}

#[test]
fn test_decode_command_shapes() {
    let power = decode_command(r#"{"comando":"power","estado":"off","timestamp":"2024-05-01T12:30:00Z"}"#).unwrap();
    assert_eq!(power.kind(), CommandKind::Power { on: false });

    let display = decode_command(&encode_command(&Command::set_display_mode(DisplayMode::Ambient))).unwrap();
    assert_eq!(
        display.kind(),
        CommandKind::SetDisplayMode {
            mode: DisplayMode::Ambient
        }
    );

    let too_hot = r#"{"comando":"set_temp_deseada","valor":50.0,"timestamp":"2024-05-01T12:30:00Z"}"#;
    assert_eq!(
        decode_command(too_hot).unwrap_err().kind(),
        CodecErrorKind::OutOfSanityBound
    );

    let no_state = r#"{"comando":"power","timestamp":"2024-05-01T12:30:00Z"}"#;
    assert_eq!(decode_command(no_state).unwrap_err(), CodecError::MissingField("estado"));
}
