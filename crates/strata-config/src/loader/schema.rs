//! Schema validation for Strata JSON5 configuration.
//!
//! Every layer is checked for unknown keys and value types so a typo fails
//! loudly with a path such as `cwd(/repo/strata.json5):evolution.neighbor_k`.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

/// Embedding providers the runtime can construct.
const EMBEDDING_PROVIDERS: &[&str] = &["ollama"];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &["$schema", "storage", "manager", "embedding", "evolution"],
        layer,
        "",
    )?;

    if let Some(value) = present(map, "$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = present(map, "storage") {
        validate_storage(value, layer, "storage")?;
    }
    if let Some(value) = present(map, "manager") {
        validate_manager(value, layer, "manager")?;
    }
    if let Some(value) = present(map, "embedding") {
        validate_embedding(value, mode, layer, "embedding")?;
    }
    if let Some(value) = present(map, "evolution") {
        validate_evolution(value, layer, "evolution")?;
    }
    Ok(())
}

/// Validate the "storage" block.
fn validate_storage(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let allowed = ["data_dir", "cached_dir", "durable_path", "evolution_path"];
    ensure_allowed_keys(map, &allowed, layer, path)?;
    for key in allowed {
        if let Some(value) = present(map, key) {
            expect_non_empty_string(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "manager" block.
fn validate_manager(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["persist_to", "default_limit"], layer, path)?;

    if let Some(value) = present(map, "persist_to") {
        expect_one_of(
            value,
            &["cached", "durable", "both"],
            layer,
            &join_path(path, "persist_to"),
        )?;
    }
    if let Some(value) = present(map, "default_limit") {
        expect_u64(value, layer, &join_path(path, "default_limit"))?;
    }
    Ok(())
}

/// Validate the "embedding" block.
///
/// The provider name is only checked on the effective config, so one layer
/// may set it and a later one fill in the rest.
fn validate_embedding(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["provider", "base_url", "model", "dimension", "timeout_secs"],
        layer,
        path,
    )?;

    if let Some(value) = present(map, "provider") {
        let provider_path = join_path(path, "provider");
        if mode == SchemaMode::Full {
            expect_one_of(value, EMBEDDING_PROVIDERS, layer, &provider_path)?;
        } else {
            expect_string(value, layer, &provider_path)?;
        }
    }
    if let Some(value) = present(map, "base_url") {
        expect_non_empty_string(value, layer, &join_path(path, "base_url"))?;
    }
    if let Some(value) = present(map, "model") {
        expect_non_empty_string(value, layer, &join_path(path, "model"))?;
    }
    if let Some(value) = present(map, "dimension") {
        expect_u64(value, layer, &join_path(path, "dimension"))?;
    }
    if let Some(value) = present(map, "timeout_secs") {
        expect_u64(value, layer, &join_path(path, "timeout_secs"))?;
    }
    Ok(())
}

/// Validate the "evolution" block.
fn validate_evolution(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "interval_hours",
            "neighbor_k",
            "similarity_threshold",
            "improvement_ttl_days",
            "strategy",
            "min_occurrences",
            "max_improvements",
        ],
        layer,
        path,
    )?;

    for key in [
        "interval_hours",
        "neighbor_k",
        "improvement_ttl_days",
        "min_occurrences",
        "max_improvements",
    ] {
        if let Some(value) = present(map, key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = present(map, "similarity_threshold") {
        expect_f64(value, layer, &join_path(path, "similarity_threshold"))?;
    }
    if let Some(value) = present(map, "strategy") {
        expect_one_of(
            value,
            &["placeholder", "recurring_patterns"],
            layer,
            &join_path(path, "strategy"),
        )?;
    }
    Ok(())
}

/// Value under `key`; an explicit `null` counts as absent (it resets the key
/// to its default when layers merge).
fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_non_empty_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(()),
        Some(_) => Err(invalid_field(layer, path, "must not be empty")),
        None => Err(invalid_field(layer, path, "expected string")),
    }
}

/// Expect one of a fixed set of string values.
fn expect_one_of(
    value: &Value,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let Some(text) = value.as_str() else {
        return Err(invalid_field(layer, path, "expected string"));
    };
    if allowed.contains(&text) {
        Ok(())
    } else {
        Err(invalid_field(
            layer,
            path,
            &format!("expected one of {}", allowed.join(", ")),
        ))
    }
}

/// Expect a non-negative JSON integer.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect any JSON number.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
