use std::{error::Error, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

const REFERENCE: &str = "../snapms/tests/data/reference.json";

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("snapms")?;

    cmd.arg("not_real.csv").args(["-d", REFERENCE]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("InputNotFound"))
        .stderr(predicate::str::contains("not_real.csv"));
    Ok(())
}

#[test]
fn test_unknown_adduct() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("snapms")?;

    cmd.arg("not_real.csv").args(["-a", "m_plus_li"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("m_plus_li"));
    Ok(())
}

#[test]
fn test_unsupported_input() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("snapms")?;

    cmd.arg(REFERENCE);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("UnsupportedInput"));
    Ok(())
}

#[test]
fn test_run_mass_list() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("snapms")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("../snapms/tests/data/masses.csv")
        .args(["-d", REFERENCE, "-t", "2", "-o"])
        .arg(dir.path());
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Loaded 5 reference compounds"))
        .stderr(predicate::str::contains("Found 3 candidate adduct masses"));

    let output = dir.path().join("masses_snapms_output.graphml");
    assert!(output.exists());
    let content = std::fs::read_to_string(output)?;
    assert!(content.contains("NPA000001"));
    assert!(content.contains("[M+H]+"));
    Ok(())
}

#[test]
fn test_run_network_compressed() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("snapms")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("../snapms/tests/data/gnps.graphml")
        .args(["-d", REFERENCE, "-z", "-o"])
        .arg(dir.path());
    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "Sub-clusters: 2 | Accepted: 1 | Rejected: 1 | Nodes: 3 | Edges: 3",
        ));

    assert!(dir.path().join("gnps_snapms_output.zip").exists());
    assert!(!dir.path().join("GNPS_componentindex_1.graphml").exists());
    Ok(())
}

#[test]
fn test_cytoscape_unavailable() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("snapms")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("../snapms/tests/data/gnps.graphml")
        .args(["-d", REFERENCE, "--cytoscape", "--cytoscape-url", "http://127.0.0.1:9/v1", "-o"])
        .arg(dir.path());
    cmd.assert().success();

    assert!(dir.path().join("GNPS_componentindex_1.graphml").exists());
    Ok(())
}
