//! End-to-end tests of the gencfg binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SAMPLE: &str = "\
# gateway configuration
interface lan0
    config ipv4 192.168.1.1/24
    dhcp-server
        range 50-199

hardware
    ethernet sort-mac lan0
";

fn gencfg() -> Command {
    Command::cargo_bin("gencfg").expect("binary builds")
}

fn write_sample(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("site.cfg");
    fs::write(&path, SAMPLE).unwrap();
    path
}

#[test]
fn test_generate_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());
    let dest = dir.path().join("out");

    gencfg()
        .arg(&config)
        .arg("-D")
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration written"));

    let network = fs::read_to_string(dest.join("etc/systemd/network/10-lan0.network")).unwrap();
    assert!(network.contains("[Match]\nName=lan0"));
    let dhcpd = fs::read_to_string(dest.join("etc/dhcpd.conf")).unwrap();
    assert!(dhcpd.contains("range 192.168.1.50 192.168.1.199;"));
    let ethernet = fs::read_to_string(dest.join("etc/sysconfig/ethernet")).unwrap();
    assert!(ethernet.contains("SETUP_METHOD=\"sort-mac\""));
}

#[test]
fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());
    let dest = dir.path().join("out");

    gencfg().arg(&config).arg("-D").arg(&dest).assert().success();
    gencfg()
        .arg(&config)
        .arg("-D")
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));
}

#[test]
fn test_check_reports_missing_destination() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());
    let dest = dir.path().join("out");

    gencfg()
        .arg(&config)
        .arg("-D")
        .arg(&dest)
        .arg("--check")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("out of date"));
}

#[test]
fn test_check_passes_after_generation() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());
    let dest = dir.path().join("out");

    gencfg().arg(&config).arg("-D").arg(&dest).assert().success();
    gencfg()
        .arg(&config)
        .arg("-D")
        .arg(&dest)
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn test_dump_text() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());

    gencfg()
        .arg(&config)
        .arg("--dump")
        .assert()
        .success()
        .stdout(predicate::str::contains("interface lan0:"));
}

#[test]
fn test_dump_json_is_valid() {
    let dir = TempDir::new().unwrap();
    let config = write_sample(dir.path());

    let output = gencfg()
        .arg(&config)
        .arg("--dump")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["children"][0]["type"], "interface");
    assert_eq!(json["children"][0]["detail"]["name"], "lan0");
}

#[test]
fn test_syntax_error_is_located() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.cfg");
    fs::write(&path, "interface lan0\n    bogus clause\n").unwrap();

    gencfg()
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("broken.cfg:2"))
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn test_missing_file_fails() {
    gencfg()
        .arg("/no/such/site.cfg")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn test_no_arguments_shows_help() {
    gencfg().assert().failure();
}
