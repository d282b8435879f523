use predicates::prelude::*;

#[test]
fn test_version_prints_semantic_version() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("procgov");
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::is_match(r"procgov \d+\.\d+\.\d+").unwrap());
}

#[test]
fn test_short_version_flag() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("procgov");
    cmd.arg("-V");

    cmd.assert()
        .success()
        .stdout(predicate::str::is_match(r"procgov \d+\.\d+\.\d+ \(\w+\)").unwrap());
}

#[test]
fn test_version_reports_package_version_and_commit() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("procgov");
    cmd.arg("--version");

    let expected = format!(r"^procgov {} \(([0-9a-f]+|unknown)\)\s*$", regex::escape(env!("CARGO_PKG_VERSION")));
    cmd.assert()
        .success()
        .stdout(predicate::str::is_match(expected).unwrap());
}
