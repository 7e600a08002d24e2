use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn defaults_when_file_and_env_are_missing() {
    let settings = load_settings_from(Path::new("/nonexistent/casegen.toml"), no_env);
    assert_eq!(settings, ClientSettings::default());
    assert_eq!(settings.provider, "gigachat");
    assert_eq!(settings.folder, "Новая ТМ");
}

#[test]
fn file_values_are_overridden_by_env() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("casegen_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let file = temp_root.join("casegen.toml");
    fs::write(
        &file,
        "base_url = \"https://qa.example.com\"\nprovider = \"openai\"\ndepth = \"full\"\nproject = \"CORE\"\n",
    )
    .expect("write config");

    let settings = load_settings_from(&file, |key| match key {
        "APP__BASE_URL" => Some("http://127.0.0.1:9000".to_string()),
        "CASEGEN_DEPTH" => Some("Atomary".to_string()),
        _ => None,
    });

    assert_eq!(settings.base_url, "http://127.0.0.1:9000");
    assert_eq!(settings.provider, "openai");
    assert_eq!(settings.depth, DepthTier::Atomary);
    assert_eq!(settings.project, "CORE");
    assert_eq!(settings.platform, "W");

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn unknown_depth_keeps_previous_value() {
    let settings = load_settings_from(Path::new("/nonexistent/casegen.toml"), |key| {
        (key == "CASEGEN_DEPTH").then(|| "bottomless".to_string())
    });
    assert_eq!(settings.depth, DepthTier::Smoke);
}

#[test]
fn generation_endpoint_swaps_scheme_and_appends_path() {
    assert_eq!(
        generation_endpoint("http://localhost:8000").expect("url").as_str(),
        "ws://localhost:8000/api/ws/generation"
    );
    assert_eq!(
        generation_endpoint("https://qa.example.com/tools/").expect("url").as_str(),
        "wss://qa.example.com/tools/api/ws/generation"
    );
    assert_eq!(
        generation_endpoint("ws://10.0.0.5:8000").expect("url").as_str(),
        "ws://10.0.0.5:8000/api/ws/generation"
    );
}

#[test]
fn generation_endpoint_rejects_other_schemes() {
    let err = generation_endpoint("ftp://example.com").expect_err("must fail");
    assert!(matches!(err, ClientError::InvalidBaseUrl { .. }));
    assert!(generation_endpoint("localhost:8000").is_err());
}

#[test]
fn rest_endpoint_keeps_prefix() {
    assert_eq!(
        rest_endpoint("https://qa.example.com/tools", "/api/system/providers")
            .expect("url")
            .as_str(),
        "https://qa.example.com/tools/api/system/providers"
    );
    assert!(rest_endpoint("ws://localhost:8000", "/api/system/providers").is_err());
}
