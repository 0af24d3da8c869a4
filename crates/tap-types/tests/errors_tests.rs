use tap_types::*;

#[test]
fn error_constructors_and_classes() {
    let e = TapError::config("unknown recipe: nope");
    assert!(e.is_config_error());
    assert!(!e.is_load_error());
    assert_eq!(e.to_string(), "Configuration error: unknown recipe: nope");

    let e = TapError::load("missing keys");
    assert!(e.is_load_error());
    assert!(!e.is_config_error());
}

#[test]
fn error_conversions() {
    let io_err: TapError = std::io::Error::new(std::io::ErrorKind::Other, "io").into();
    match io_err {
        TapError::IO { .. } => {}
        _ => panic!("wrong kind"),
    }

    let ser_err: TapError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    match ser_err {
        TapError::Serialization { .. } => {}
        _ => panic!("wrong kind"),
    }

    let toml_err: TapError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
    assert!(toml_err.is_config_error());
}
