use super::*;

#[test]
fn defaults_match_documented_values() {
    let cfg = HostConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.renderer.targets, 2);
    assert_eq!(cfg.renderer.layers.len(), 6);
    assert!(!cfg.renderer.layers[4].opaque_pass);
    assert!(cfg.renderer.layers[3].opaque_pass);
    assert_eq!(cfg.renderer.layers[1].kind, LayerKind::Fit(Anchor::LeftTop));
    assert_eq!(cfg.recorder.max_fps, 30);
    assert_eq!(cfg.recorder.key_frame_interval(), 30);
    assert_eq!(cfg.recorder.ready_wait(), Duration::from_millis(500));
    assert_eq!(cfg.recorder.drain_deadline(), Duration::from_secs(5));
    assert_eq!(cfg.snapshot_fps, 15);
}

#[test]
fn partial_json_fills_defaults() {
    let cfg = HostConfig::from_json_str(
        r#"{
            "recorder": { "max_fps": 24, "timing": "frame_count" },
            "renderer": { "layers": [ { "kind": { "fit": "center" }, "opaque_pass": false } ] }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.recorder.max_fps, 24);
    assert_eq!(cfg.recorder.timing, TimingMode::FrameCount);
    assert!(cfg.recorder.rate_limit);
    assert_eq!(
        cfg.renderer.layers,
        vec![LayerSpec {
            kind: LayerKind::Fit(Anchor::Center),
            opaque_pass: false
        }]
    );
}

#[test]
fn bad_values_are_config_errors() {
    let err = HostConfig::from_json_str(r#"{"renderer":{"targets":1}}"#).unwrap_err();
    assert!(err.is_config(), "{err}");

    let err = HostConfig::from_json_str(r#"{"recorder":{"max_fps":0}}"#).unwrap_err();
    assert!(err.is_config());

    let err = HostConfig::from_json_str(
        r#"{"renderer":{"layers":[{"kind":{"fit":"upside_down"}}]}}"#,
    )
    .unwrap_err();
    assert!(err.is_config());

    let err = HostConfig::from_json_str(r#"{"recorder":{"pool_capacity":0}}"#).unwrap_err();
    assert!(err.is_config());

    let err = HostConfig::from_json_str(r#"{"surprise":true}"#).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn malformed_json_is_a_serde_error() {
    let err = HostConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, LayercastError::Serde(_)));
}

#[test]
fn missing_file_is_reported_with_path() {
    let err = HostConfig::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
    assert!(err.to_string().contains("here.json"));
}
