use tap_types::*;

#[test]
fn precision_parse_known_names() {
    assert_eq!(Precision::parse("float16"), Some(Precision::Float16));
    assert_eq!(Precision::parse("bfloat16"), Some(Precision::BFloat16));
    assert_eq!(Precision::parse("float32"), Some(Precision::Float32));
    assert_eq!(Precision::Float16.to_string(), "float16");
}

#[test]
fn precision_parse_unknown_is_none() {
    assert_eq!(Precision::parse("bogus"), None);
    assert_eq!(Precision::parse("FLOAT16"), None);
    assert_eq!(Precision::parse(""), None);
}

#[test]
fn mode_and_accelerator_helpers() {
    assert_eq!(Mode::default(), Mode::Eval);
    assert!(Mode::from_training(true).is_training());
    assert!(!Mode::from_training(false).is_training());
    assert_eq!(Mode::Eval.to_string(), "eval");

    assert!(!Accelerator::None.is_available());
    assert!(Accelerator::Cuda.is_available());
    assert_eq!(Accelerator::Metal.to_string(), "metal");
}

#[test]
fn precision_serde_names() {
    let json = serde_json::to_string(&Precision::BFloat16).unwrap();
    assert_eq!(json, "\"bfloat16\"");
    let parsed: Precision = serde_json::from_str("\"float32\"").unwrap();
    assert_eq!(parsed, Precision::Float32);
}
