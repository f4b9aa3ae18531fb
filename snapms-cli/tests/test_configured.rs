use std::fs;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};

use snapms_cli::SnapMS;

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_configured_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = Figment::new()
        .merge(Toml::file_exact("tests/data/annotate_network.toml"))
        .merge(Serialized::default("output_dir", dir.path()));
    let driver: SnapMS = config.extract().unwrap();
    assert_eq!(driver.min_gnps_size, 3);
    assert!(driver.remove_duplicates);
    driver.main().unwrap();

    let output = dir.path().join("GNPS_componentindex_1.graphml");
    let content = fs::read_to_string(output).unwrap();
    assert!(content.contains("componentindex"));
    assert!(!dir.path().join("GNPS_componentindex_3.graphml").exists());
}

#[test_log::test]
fn test_configured_fungi_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Figment::new();
    config = config.merge(Toml::string(&format!(
        r#"
input_file = "../snapms/tests/data/masses.csv"
reference_db = "../snapms/tests/data/reference.json"
organism_filter = "fungi"
output_dir = "{}"
"#,
        dir.path().display().to_string().replace('\\', "/")
    )));
    let driver: SnapMS = config.extract().unwrap();
    driver.main().unwrap();
    assert!(!dir.path().join("masses_snapms_output.graphml").exists());
}
