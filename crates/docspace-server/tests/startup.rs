//! Integration test: the server refuses to start on a malformed config file
//! instead of falling back to defaults.

use std::process::Command;

#[test]
fn exits_nonzero_on_malformed_config() {
    let bin = env!("CARGO_BIN_EXE_docspace-server");
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[storage\nreceived_root = ").expect("write config");

    let output = Command::new(bin)
        .arg("--config")
        .arg(&config)
        .env_remove("DOCSPACE_LISTEN")
        .env_remove("DOCSPACE_AUTH_SECRET")
        .output()
        .expect("failed to execute docspace-server binary");

    assert!(
        !output.status.success(),
        "expected failure, got {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));
}
