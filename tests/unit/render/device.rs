use super::*;
use crate::render::shaders::{BASE_FRAG, BASE_VERT, named};

#[test]
fn handles_reject_zero() {
    assert!(TextureId::from_raw(0).is_none());
    assert_eq!(TextureId::from_raw(7).map(TextureId::raw), Some(7));
}

#[test]
fn fan_and_strip_expand_to_two_triangles_for_a_quad() {
    assert_eq!(
        Topology::TriangleFan.triangles(0, 4),
        vec![[0, 1, 2], [0, 2, 3]]
    );
    assert_eq!(
        Topology::TriangleStrip.triangles(0, 4),
        vec![[0, 1, 2], [1, 2, 3]]
    );
    assert!(Topology::TriangleFan.triangles(0, 2).is_empty());
}

#[test]
fn library_sources_link() {
    let linked = link_interface(&BASE_VERT, &BASE_FRAG).unwrap();
    assert_eq!(linked.attributes.get("a_position"), Some(&0));
    assert_eq!(linked.attributes.get("a_tex_coord"), Some(&1));
    assert_eq!(linked.uniforms.get("u_matrix"), Some(&0));
    assert_eq!(linked.uniforms.get("u_texture"), Some(&1));
    assert!(named("base_vert").is_some());
    assert!(named("nope").is_none());
}

#[test]
fn missing_entry_point_reports_log() {
    let broken = ShaderSource {
        name: "broken_frag",
        code: "@fragment fn main() {}",
        ..BASE_FRAG
    };
    let err = link_interface(&BASE_VERT, &broken).unwrap_err();
    assert!(err.is_config());
    let msg = err.to_string();
    assert!(msg.contains("missing entry point fs_main"), "{msg}");
    assert!(msg.contains("undeclared identifier 'u_texture'"), "{msg}");
}

#[test]
fn swapped_stages_fail() {
    let err = link_interface(&BASE_FRAG, &BASE_VERT).unwrap_err();
    assert!(err.to_string().contains("expected Vertex"));
}
