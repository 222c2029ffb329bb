//! Tests for layered configuration loading.

use super::*;
use crate::{ImprovementStrategyKind, PersistMode};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Options rooted in a temp tree with no real user config.
fn isolated_options(cwd: &Path) -> LayeredConfigOptions {
    let mut options = LayeredConfigOptions::new(cwd);
    options.user_config_path = None;
    options
}

#[test]
fn parse_minimal_config_applies_defaults() {
    let config = StrataConfig::load_from_str("{}").expect("config");
    assert_eq!(config, StrataConfig::default());
    assert_eq!(config.manager.persist_to, PersistMode::Both);
    assert_eq!(config.manager.default_limit, 5);
    assert_eq!(config.embedding.base_url, "http://localhost:11434");
    assert_eq!(config.embedding.model, "llama3.2:latest");
    assert_eq!(config.embedding.dimension, 4096);
    assert_eq!(config.evolution.interval_hours, 72);
    assert_eq!(config.evolution.neighbor_k, 5);
    assert_eq!(config.evolution.improvement_ttl_days, 30);
    assert_eq!(config.evolution.strategy, ImprovementStrategyKind::Placeholder);
}

#[test]
fn storage_paths_resolve_under_data_dir() {
    let config = StrataConfig::load_from_str(
        r#"{ storage: { data_dir: "/var/strata", evolution_path: "/tmp/evo.db" } }"#,
    )
    .expect("config");
    assert_eq!(
        config.storage.cached_dir(),
        Path::new("/var/strata/warm_memory")
    );
    assert_eq!(
        config.storage.durable_path(),
        Path::new("/var/strata/long_term_memory.db")
    );
    assert_eq!(config.storage.evolution_path(), Path::new("/tmp/evo.db"));

    let defaults = StrataConfig::default();
    assert_eq!(
        defaults.storage.durable_path(),
        Path::new("data/long_term_memory.db")
    );
}

#[test]
fn parses_json5_syntax_and_enums() {
    let json5 = r#"
    {
        // comments and trailing commas are fine
        manager: { persist_to: "durable", default_limit: 9, },
        evolution: { strategy: "recurring_patterns", similarity_threshold: 0.75 },
    }"#;
    let config = StrataConfig::load_from_str(json5).expect("config");
    assert_eq!(config.manager.persist_to, PersistMode::Durable);
    assert_eq!(config.manager.default_limit, 9);
    assert_eq!(
        config.evolution.strategy,
        ImprovementStrategyKind::RecurringPatterns
    );
    assert_eq!(config.evolution.similarity_threshold, 0.75);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = StrataConfig::load_from_str(r#"{ unexpected: true }"#).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("config:unexpected"));
    assert!(msg.contains("unknown key"));
}

#[test]
fn rejects_unknown_nested_key_with_path() {
    let err = StrataConfig::load_from_str(r#"{ evolution: { neighbour_k: 3 } }"#).unwrap_err();
    assert!(format!("{err}").contains("evolution.neighbour_k"));
}

#[test]
fn rejects_invalid_persist_mode() {
    let err = StrataConfig::load_from_str(r#"{ manager: { persist_to: "cloud" } }"#).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("manager.persist_to"));
    assert!(msg.contains("expected one of"));
}

#[test]
fn rejects_unknown_embedding_provider() {
    let err =
        StrataConfig::load_from_str(r#"{ embedding: { provider: "openai" } }"#).unwrap_err();
    assert!(format!("{err}").contains("embedding.provider"));
}

#[test]
fn validate_enforces_cross_field_rules() {
    for json5 in [
        r#"{ evolution: { similarity_threshold: 1.5 } }"#,
        r#"{ evolution: { neighbor_k: 0 } }"#,
        r#"{ evolution: { interval_hours: 0 } }"#,
        r#"{ embedding: { dimension: 0 } }"#,
    ] {
        let err = StrataConfig::load_from_str(json5).expect_err(json5);
        assert!(matches!(err, ConfigError::Invalid(_)), "{json5}: {err}");
    }
}

#[test]
fn cwd_layer_overrides_project_and_user() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let user_config = root.join("user.json5");
    write_json5(
        &user_config,
        r#"{ manager: { default_limit: 1 }, embedding: { model: "user-model" } }"#,
    );
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        r#"{ manager: { default_limit: 2, persist_to: "cached" } }"#,
    );
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        r#"{ manager: { default_limit: 3 } }"#,
    );

    let mut options = isolated_options(&cwd);
    options.user_config_path = Some(user_config);
    let layered = StrataConfig::load_layered_with_options(options).expect("layered");

    assert_eq!(layered.config.manager.default_limit, 3);
    assert_eq!(layered.config.manager.persist_to, PersistMode::Cached);
    assert_eq!(layered.config.embedding.model, "user-model");
    let sources: Vec<_> = layered.layers.iter().map(|layer| layer.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd
        ]
    );
}

#[test]
fn runtime_layer_wins_and_null_restores_default() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("work");
    fs::create_dir_all(&cwd).expect("cwd");
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        r#"{ storage: { data_dir: "/srv/mem", cached_dir: "/srv/cache" } }"#,
    );
    let runtime = temp.path().join("runtime.json5");
    write_json5(&runtime, r#"{ storage: { cached_dir: null }, evolution: { neighbor_k: 7 } }"#);

    let options = isolated_options(&cwd).with_runtime_path(&runtime);
    let layered = StrataConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(
        layered.config.storage.cached_dir(),
        Path::new("/srv/mem/warm_memory")
    );
    assert_eq!(layered.config.evolution.neighbor_k, 7);
    assert_eq!(layered.layers.len(), 2);
}

#[test]
fn project_root_equal_to_cwd_is_loaded_once() {
    let temp = TempDir::new().expect("tmp");
    let project_root = temp.path().join("repo");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        r#"{ manager: { default_limit: 4 } }"#,
    );

    let layered =
        StrataConfig::load_layered_with_options(isolated_options(&project_root)).expect("layered");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.layers[0].source, ConfigLayerSource::Project);
    assert_eq!(layered.config.manager.default_limit, 4);
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_runtime_path(temp.path().join("absent.json5"));
    let err = StrataConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed { .. }));
}

#[test]
fn layer_errors_name_the_layer() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("work");
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        r#"{ storage: { data_dir: 42 } }"#,
    );
    let err = StrataConfig::load_layered_with_options(isolated_options(&cwd)).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("));
    assert!(msg.contains("storage.data_dir"));
}
