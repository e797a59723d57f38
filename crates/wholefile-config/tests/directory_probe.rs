use std::fs;

use wholefile_config::{ConfigIssueKind, StageConfig, validate_directory};
use wholefile_test_support::fixtures::temp_dir;

#[test]
fn directory_behind_regular_file_is_rejected() -> anyhow::Result<()> {
    let temp = temp_dir("config-probe")?;
    let blocker = temp.path().join("not-a-directory");
    fs::write(&blocker, b"occupied")?;

    let issues = validate_directory(&blocker.join("out"));
    assert_eq!(issues.len(), 1);
    assert!(matches!(
        issues[0].kind,
        ConfigIssueKind::DirectoryParentUncreatable | ConfigIssueKind::DirectoryInaccessible
    ));
    assert!(issues[0].source.is_some());
    Ok(())
}

#[test]
fn directory_that_is_a_file_is_inaccessible() -> anyhow::Result<()> {
    let temp = temp_dir("config-probe")?;
    let blocker = temp.path().join("plain-file");
    fs::write(&blocker, b"occupied")?;

    let issues = validate_directory(&blocker);
    assert_eq!(issues.len(), 1);
    assert_ne!(issues[0].kind, ConfigIssueKind::DirectoryParentUncreatable);
    Ok(())
}

#[cfg(unix)]
#[test]
fn read_only_directory_reports_uncreatable_file() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let temp = temp_dir("config-probe")?;
    let locked = temp.path().join("locked");
    fs::create_dir(&locked)?;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))?;

    // Privileged users bypass directory permissions entirely.
    let writable_anyway = fs::write(locked.join("canary"), b"x").is_ok();
    let issues = validate_directory(&locked);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

    if writable_anyway {
        assert!(issues.is_empty());
    } else {
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ConfigIssueKind::DirectoryFileUncreatable);
    }
    Ok(())
}

#[test]
fn config_document_round_trips_through_disk() -> anyhow::Result<()> {
    let temp = temp_dir("config-doc")?;
    let out = temp.path().join("out");
    let doc = temp.path().join("stage.json");
    fs::write(
        &doc,
        serde_json::to_vec(&serde_json::json!({ "directory": out }))?,
    )?;

    let config = StageConfig::from_path(&doc)?;
    assert_eq!(config.directory, out);
    assert!(validate_directory(&config.directory).is_empty());
    Ok(())
}
