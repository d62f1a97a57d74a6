use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const QUAD_OBJ: &str = "\
v -0.5 0 -0.5
v 0.5 0 -0.5
v 0.5 0 0.5
v -0.5 0 0.5
f 1 2 3 4
";

fn build_scene_dir() -> TempDir {
    let scene = r#"<scene>
  <object>
    <name>Barrel</name>
    <kind>grab</kind>
    <mesh>models/quad.obj</mesh>
    <position>1 0 -2</position>
  </object>
  <object>
    <name>Ground</name>
    <kind>floor</kind>
    <mesh>models/quad.obj</mesh>
    <scale>10 1 10</scale>
  </object>
  <object>
    <name>Pillar</name>
    <position>0 0 -4</position>
  </object>
</scene>
"#;

    let dir = TempDir::new().expect("temp scene dir");
    fs::create_dir(dir.path().join("models")).expect("models dir");
    fs::write(dir.path().join("scene.xml"), scene).expect("write scene.xml");
    fs::write(dir.path().join("models/quad.obj"), QUAD_OBJ).expect("write quad.obj");
    dir
}

#[test]
fn cli_loads_bundle_and_prints_final_state() {
    let scene_dir = build_scene_dir();
    let mut cmd = Command::cargo_bin("xr-stage").expect("binary exists");
    cmd.arg(scene_dir.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 objects"))
        .stdout(contains(" - Barrel (grab)"))
        .stdout(contains("Launched 2 mesh load(s)"))
        .stdout(contains(" - Barrel [grab] pos=(1.00, 0.00, -2.00)"))
        .stdout(contains(" - Ground [floor] pos=(0.00, 0.00, 0.00)"))
        .stdout(contains(" - Pillar [prop] pos=(0.00, 0.00, -4.00)"));
}

#[test]
fn missing_mesh_file_is_not_fatal() {
    let scene_dir = build_scene_dir();
    fs::write(
        scene_dir.path().join("scene.xml"),
        r#"<scene>
  <object>
    <name>Good</name>
    <kind>grab</kind>
    <mesh>models/quad.obj</mesh>
  </object>
  <object>
    <name>Bad</name>
    <kind>grab</kind>
    <mesh>models/missing.obj</mesh>
  </object>
</scene>
"#,
    )
    .expect("write scene.xml");

    let mut cmd = Command::cargo_bin("xr-stage").expect("binary exists");
    cmd.arg(scene_dir.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains(" - Good [grab] pos=(0.00, 0.00, 0.00)"));
}

#[test]
fn unknown_argument_is_rejected() {
    let scene_dir = build_scene_dir();
    let mut cmd = Command::cargo_bin("xr-stage").expect("binary exists");
    cmd.arg(scene_dir.path()).arg("--frobnicate");
    cmd.assert().failure().stderr(contains("Unknown argument"));
}
