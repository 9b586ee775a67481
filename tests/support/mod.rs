use assert_cmd::{cargo::cargo_bin_cmd, Command};
use std::fs;
use std::path::Path;

/// Get a Command for plgrade
pub fn plgrade() -> Command {
    cargo_bin_cmd!("plgrade")
}

/// One assessment instance (10 points, 2 bonus) with an auto-graded
/// question in zone 1 and a rubric-graded question outside any zone
pub const GRADEBOOK: &str = r#"{
  "zones": [{ "id": 1, "number": 1 }],
  "rubrics": [{
    "id": 5,
    "items": [
      { "id": "correct", "order": 0, "points": 4, "description": "Correct answer" },
      { "id": "partial", "order": 1, "points": 2, "description": "Shows work" },
      { "id": "typo", "order": 2, "points": -1, "description": "Typo" }
    ]
  }],
  "assessment_instances": [
    { "id": 1, "max_points": 10, "max_bonus_points": 2 }
  ],
  "instance_questions": [
    { "id": 1, "assessment_instance_id": 1, "zone_id": 1, "max_points": 6,
      "max_auto_points": 6, "max_manual_points": 0, "auto_points": 6 },
    { "id": 2, "assessment_instance_id": 1, "max_points": 6, "max_auto_points": 0,
      "max_manual_points": 6, "manual_rubric_id": 5 }
  ],
  "submissions": [
    { "instance_question_id": 1 },
    { "instance_question_id": 2 }
  ]
}"#;

/// Initialize a gradebook in `root` and load [`GRADEBOOK`] into it
pub fn setup_gradebook(root: &Path) {
    plgrade().arg("--root").arg(root).arg("init").assert().success();

    let fixture = root.join("gradebook.json");
    fs::write(&fixture, GRADEBOOK).unwrap();
    plgrade()
        .arg("--root")
        .arg(root)
        .arg("load")
        .arg(&fixture)
        .assert()
        .success();
}

/// Run plgrade with `--format json` in `root` and parse stdout
#[allow(dead_code)]
pub fn json_output(root: &Path, args: &[&str]) -> serde_json::Value {
    let output = plgrade()
        .arg("--root")
        .arg(root)
        .args(["--format", "json"])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "plgrade {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}
