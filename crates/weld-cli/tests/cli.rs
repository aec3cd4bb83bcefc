use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;
use tempfile::{TempDir, tempdir};

// Build-related variables from the host must not leak into the fixtures.
fn weld() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("weld"));
    for var in [
        "ENGINE_HOME",
        "SUPPORT_HOME",
        "SUPPORT_MT",
        "INTERP_HOME",
        "INCLUDE",
        "LIB",
        "DEBUG",
        "MAKE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn project_dir() -> TempDir {
    tempdir().expect("tempdir should work")
}

fn path_arg(dir: &TempDir) -> &str {
    dir.path().to_str().expect("path utf8")
}

#[test]
fn plan_reports_engine_paths() {
    let dir = project_dir();
    weld()
        .args(["plan", "--project-dir", path_arg(&dir), "--engine-home", "/opt/v8"])
        .assert()
        .success()
        .stdout(contains("module        _bridge"))
        .stdout(contains("mode          release"))
        .stdout(contains("/opt/v8/include"))
        .stdout(contains("library dirs"));
}

#[test]
fn plan_json_is_parseable() {
    let dir = project_dir();
    let output = weld()
        .args(["plan", "--json", "--project-dir", path_arg(&dir)])
        .output()
        .expect("command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value =
        serde_json::from_str(&stdout).expect("plan output should be JSON");
    assert_eq!(value["module"], "_bridge");
    assert_eq!(value["mode"], "release");
    assert!(value["platform"]["os"].is_string());
    assert!(value["sources"].is_array());
}

#[test]
fn debug_env_var_selects_debug_mode() {
    let dir = project_dir();
    weld()
        .env("DEBUG", "1")
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("mode          debug"));
}

// Decorated names only show on Unix; the MSVC side auto-links the support
// runtime and lists no boost names in the plan.
#[cfg(unix)]
#[test]
fn support_mt_env_var_decorates_the_libraries() {
    let dir = project_dir();
    weld()
        .env("SUPPORT_MT", "1")
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("boost_python-mt"));
}

#[test]
fn cli_engine_home_overrides_env() {
    let dir = project_dir();
    weld()
        .env("ENGINE_HOME", "/engine/from-env")
        .args(["plan", "--project-dir", path_arg(&dir), "--engine-home", "/engine/from-cli"])
        .assert()
        .success()
        .stdout(contains("/engine/from-cli"))
        .stdout(contains("/engine/from-env").not());
}

#[test]
fn include_and_lib_env_paths_reach_the_plan() {
    let dir = project_dir();
    let include =
        std::env::join_paths(["/extra/inc-a", "/extra/inc-b"]).expect("join should work");
    let lib = std::env::join_paths(["/extra/lib-x"]).expect("join should work");

    weld()
        .env("INCLUDE", &include)
        .env("LIB", &lib)
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("/extra/inc-a"))
        .stdout(contains("/extra/inc-b"))
        .stdout(contains("/extra/lib-x"));
}

#[test]
fn include_flag_replaces_the_env_list() {
    let dir = project_dir();
    weld()
        .env("INCLUDE", "/env/include")
        .args([
            "plan",
            "--project-dir",
            path_arg(&dir),
            "--include",
            "/cli/include",
        ])
        .assert()
        .success()
        .stdout(contains("/cli/include"))
        .stdout(contains("/env/include").not());
}

#[test]
fn config_file_overrides_module_name() {
    let dir = project_dir();
    fs::write(
        dir.path().join("weld.json"),
        r#"{"module":{"name":"_demo"}}"#,
    )
    .expect("write should work");

    weld()
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("module        _demo"))
        .stdout(contains("artifact      _demo"));
}

#[test]
fn malformed_config_fails_with_the_file_named() {
    let dir = project_dir();
    fs::write(dir.path().join("weld.json"), "{\n  \"module\":\n").expect("write should work");

    weld()
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .failure()
        .stderr(contains("failed parsing config file"))
        .stderr(contains("weld.json"));
}

#[test]
fn unknown_config_field_is_rejected() {
    let dir = project_dir();
    let config = dir.path().join("custom.json");
    fs::write(&config, r#"{"modules":{"name":"_demo"}}"#).expect("write should work");

    weld()
        .args([
            "plan",
            "--project-dir",
            path_arg(&dir),
            "--config",
            config.to_str().expect("path utf8"),
        ])
        .assert()
        .failure()
        .stderr(contains("unknown field"));
}

#[test]
fn warnings_land_on_stderr_unless_quiet() {
    let dir = project_dir();
    weld()
        .args(["plan", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stderr(contains("engine home is not set"));

    weld()
        .args(["plan", "--quiet", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stderr(contains("engine home is not set").not());
}

#[test]
fn doctor_reports_the_environment() {
    let dir = project_dir();
    weld()
        .args(["doctor", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("platform      "))
        .stdout(contains("engine        (home not set)"))
        .stdout(contains("compiler      "))
        .stdout(contains("make          "))
        .stdout(contains("trace tool    dtrace"));
}

#[cfg(unix)]
fn fake_dtrace_dir() -> TempDir {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir should work");
    let script = dir.path().join("dtrace");
    fs::write(
        &script,
        r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
[ -n "$out" ] && : > "$out"
exit 0
"#,
    )
    .expect("write should work");
    let mut perms = fs::metadata(&script)
        .expect("metadata should work")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("chmod should work");
    dir
}

#[cfg(unix)]
#[test]
fn probes_generates_with_the_trace_tool() {
    let dir = project_dir();
    fs::create_dir_all(dir.path().join("src")).expect("mkdir should work");
    fs::write(dir.path().join("src/probes.d"), "provider bridge {};\n")
        .expect("write should work");

    let tools = fake_dtrace_dir();
    weld()
        .env("PATH", tools.path())
        .args(["probes", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("probes generated"));

    assert!(dir.path().join("src/probes.h").exists());
}

#[cfg(unix)]
#[test]
fn probes_falls_back_to_patching_the_config_header() {
    let dir = project_dir();
    fs::create_dir_all(dir.path().join("src")).expect("mkdir should work");
    fs::write(dir.path().join("src/probes.d"), "provider bridge {};\n")
        .expect("write should work");
    fs::write(
        dir.path().join("src/Config.h"),
        "#pragma once\n\n#define SUPPORT_PROBES 1\n",
    )
    .expect("write should work");

    let empty = tempdir().expect("tempdir should work");
    weld()
        .env("PATH", empty.path())
        .args(["probes", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("probes disabled (config header patched)"));

    let patched =
        fs::read_to_string(dir.path().join("src/Config.h")).expect("read should work");
    assert!(patched.contains("//#define SUPPORT_PROBES 1"));
    assert!(dir.path().join("src/Config.h.bak").exists());
}

#[cfg(unix)]
#[test]
fn no_probes_flag_skips_probe_generation() {
    let dir = project_dir();
    fs::create_dir_all(dir.path().join("src")).expect("mkdir should work");
    let header = "#pragma once\n\n#define SUPPORT_PROBES 1\n";
    fs::write(dir.path().join("src/Config.h"), header).expect("write should work");

    // No sources exist, so the build fails after the probe stage either way.
    let empty = tempdir().expect("tempdir should work");
    weld()
        .env("PATH", empty.path())
        .args(["build", "--no-probes", "--project-dir", path_arg(&dir)])
        .assert()
        .failure()
        .stderr(contains("failed reading source"));
    assert_eq!(
        fs::read_to_string(dir.path().join("src/Config.h")).expect("read should work"),
        header
    );
    assert!(!dir.path().join("src/Config.h.bak").exists());

    weld()
        .env("PATH", empty.path())
        .args(["build", "--project-dir", path_arg(&dir)])
        .assert()
        .failure()
        .stderr(contains("failed reading source"));
    let patched =
        fs::read_to_string(dir.path().join("src/Config.h")).expect("read should work");
    assert!(patched.contains("//#define SUPPORT_PROBES 1"));
}

#[cfg(unix)]
#[test]
fn build_links_and_skips_when_up_to_date() {
    // Hosts without a C++ compiler cannot run the end-to-end check.
    if std::process::Command::new("c++")
        .arg("--version")
        .output()
        .is_err()
    {
        return;
    }

    let dir = project_dir();
    fs::create_dir_all(dir.path().join("src")).expect("mkdir should work");
    fs::write(
        dir.path().join("src/Demo.cpp"),
        "extern \"C\" int demo_value() { return 42; }\n",
    )
    .expect("write should work");
    fs::write(
        dir.path().join("weld.json"),
        r#"{
  "module": {"name": "_demo", "sources": ["src/Demo.cpp"]},
  "support": {"libraries": []},
  "probes": {"enabled": false}
}"#,
    )
    .expect("write should work");

    weld()
        .args(["build", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("built "));
    assert!(dir.path().join("build/_demo.so").exists());

    // A bare invocation dispatches to build and lands on the fingerprint.
    weld()
        .args(["--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("is up to date"));

    weld()
        .args(["build", "--force", "--project-dir", path_arg(&dir)])
        .assert()
        .success()
        .stdout(contains("built "));
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[test]
fn snapshot_plan_text() {
    let dir = project_dir();
    let output = weld()
        .args(["plan", "--project-dir", path_arg(&dir), "--engine-home", "/v8"])
        .output()
        .expect("command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    insta::assert_snapshot!("plan_text_linux", stdout.trim_end());
}
