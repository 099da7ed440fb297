use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const CUBE_FACE: &str = "\
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
f 1 2 3 4
";

fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    tmp.write_all(contents.as_bytes()).expect("write temp file");
    tmp
}

fn viewer() -> Command {
    Command::cargo_bin("viewport-session").expect("binary exists")
}

#[test]
fn headless_run_loads_model_and_renders_frames() {
    let model = write_temp(".obj", CUBE_FACE);
    viewer()
        .arg(model.path())
        .args(["--headless", "--frames", "5"])
        .assert()
        .success()
        .stdout(contains("Load state: Ready"))
        .stdout(contains("Rendered 5 frame(s)"))
        .stdout(contains("Draw items: 1 (2 visible triangles, 2 lights)"))
        .stdout(contains("Camera aspect: 1.00"))
        .stdout(contains("Post-processing").not());
}

#[test]
fn missing_model_leaves_viewer_empty_without_failing() {
    viewer()
        .args(["does-not-exist.obj", "--headless", "--frames", "3"])
        .assert()
        .success()
        .stdout(contains("Load state: LoadFailed"))
        .stdout(contains("Rendered 0 frame(s)"))
        .stderr(contains("Failed to load does-not-exist.obj"));
}

#[test]
fn config_file_sets_viewport_size() {
    let model = write_temp(".obj", CUBE_FACE);
    let config = write_temp(
        ".xml",
        r#"<viewer>
    <width>800</width>
    <height>600</height>
    <light>
        <type>ambient</type>
        <intensity>0.5</intensity>
    </light>
</viewer>"#,
    );
    viewer()
        .arg(model.path())
        .arg("--config")
        .arg(config.path())
        .args(["--headless", "--frames", "2"])
        .assert()
        .success()
        .stdout(contains("Rendered 2 frame(s)"))
        .stdout(contains("1 lights)"))
        .stdout(contains("Camera aspect: 1.33"));
}

#[test]
fn bloom_variant_reports_post_processing() {
    viewer()
        .args(["--headless", "--bloom", "--frames", "1"])
        .assert()
        .success()
        .stdout(contains("Load state: Ready"))
        .stdout(contains(
            "Post-processing: bloom=true tone mapping=Reinhard exposure=1.00",
        ));
}

#[test]
fn unsupported_format_is_a_load_failure() {
    let model = write_temp(".gltf", "{}");
    viewer()
        .arg(model.path())
        .args(["--headless", "--frames", "1"])
        .assert()
        .success()
        .stdout(contains("Load state: LoadFailed"))
        .stderr(contains("unsupported asset format: gltf"));
}

#[test]
fn unknown_flag_is_rejected() {
    viewer()
        .args(["--headless", "--sparkles"])
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --sparkles"));
}
