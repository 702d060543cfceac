use std::path::PathBuf;

use adscanner::config::AppConfig;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// The shipped default configuration
pub fn default_config() -> AppConfig {
    AppConfig::default_template().unwrap_or_else(|e| panic!("Default config does not load: {}", e))
}

/// Default configuration with probes pointed at a mock server's `/pixel/` path
pub fn config_probing(server_uri: &str, timeout_ms: u64) -> AppConfig {
    let mut config = default_config();
    config.probe.url_template = format!("{}/pixel/{{domain}}", server_uri);
    config.probe.timeout_ms = timeout_ms;
    config
}
