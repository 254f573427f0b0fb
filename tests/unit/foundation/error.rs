use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        LayercastError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        LayercastError::encode("x")
            .to_string()
            .contains("encode error:")
    );
    assert!(
        LayercastError::capture("x")
            .to_string()
            .contains("capture error:")
    );
    assert!(LayercastError::asset("x").to_string().contains("asset error:"));
    assert!(
        LayercastError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn recording_errors_convert_and_keep_their_message() {
    let err: LayercastError = RecordingError::NotConfigured.into();
    assert!(matches!(
        err,
        LayercastError::Recording(RecordingError::NotConfigured)
    ));
    assert!(err.to_string().contains("not configured"));
    assert!(!err.is_config());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = LayercastError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
