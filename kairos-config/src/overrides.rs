//! Generic JSON-tree merge and dotted-path override application shared by
//! the XDG-TOML, `.env`/process-env, and `--set` override stages (spec §6:
//! "defaults → XDG TOML → .env → process env → --set, highest precedence
//! last").
//!
//! There is no teacher analogue for a typed, multi-source config tree (the
//! teacher's `config` crate only resolves a flat `HashMap<String, String>`
//! of environment variables); this is new, built in the teacher's plain
//! "small pure functions with explicit precedence" style.

use std::collections::HashMap;

use serde_json::Value;

use crate::ConfigError;

/// Converts a parsed TOML document into the equivalent JSON value (both
/// implement `serde::Serialize`, so this is a lossless structural copy for
/// the scalar/array/table shapes a config file uses).
pub fn toml_to_json(value: toml::Value) -> Result<Value, ConfigError> {
    serde_json::to_value(value).map_err(ConfigError::JsonConvert)
}

/// Recursively merges `patch` onto `base`: objects merge key-by-key;
/// anything else (scalars, arrays) in `patch` replaces the value in `base`
/// wholesale. `base` is assumed to already contain every key a caller might
/// want to override (it is the serialized `Default` config).
pub fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, patch_value),
                    None => {
                        base_map.insert(key, patch_value);
                    }
                }
            }
        }
        (base_slot, patch_value) => *base_slot = patch_value,
    }
}

/// Every dotted path to a scalar (non-object, non-array) leaf in `value`,
/// e.g. `llm.model`, `mcp.servers.fs.timeout_s`. Arrays are treated as
/// opaque leaves themselves (not descended into) since env/`--set` overrides
/// only make sense for scalar fields — see `DESIGN.md` for this ambiguity
/// call.
pub fn leaf_paths(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect(value, String::new(), &mut out);
    out
}

fn collect(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                collect(child, path, out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push(prefix);
            }
        }
    }
}

/// Looks up the current `Value` at a dotted path, for type-directed parsing
/// of an override's raw string.
fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, segment| v.get(segment))
}

fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |v, segment| v.get_mut(segment))
}

/// Parses `raw` according to the existing JSON type at `path` (bool/number
/// fall back to string on parse failure, matching the common env-var
/// convention of "everything is a string unless it obviously isn't") and
/// writes it in place.
pub fn apply_dotted(value: &mut Value, path: &str, raw: &str) -> Result<(), ConfigError> {
    let existing_is_bool = matches!(get(value, path), Some(Value::Bool(_)));
    let existing_is_number = matches!(get(value, path), Some(Value::Number(_)));

    let new_value = if existing_is_bool {
        raw.parse::<bool>().map(Value::Bool).unwrap_or_else(|_| Value::String(raw.to_string()))
    } else if existing_is_number {
        if let Ok(i) = raw.parse::<i64>() {
            Value::Number(i.into())
        } else if let Ok(f) = raw.parse::<f64>() {
            serde_json::Number::from_f64(f).map(Value::Number).unwrap_or_else(|| Value::String(raw.to_string()))
        } else {
            Value::String(raw.to_string())
        }
    } else {
        Value::String(raw.to_string())
    };

    let Some(slot) = get_mut(value, path) else {
        return Err(ConfigError::UnknownKey(path.to_string()));
    };
    *slot = new_value;
    Ok(())
}

/// Converts a dotted path (`llm.model`) into its environment-variable name
/// (`KAIROS_LLM_MODEL`), per spec §6 "dotted paths mapped to `_`".
pub fn env_var_name(prefix: &str, path: &str) -> String {
    format!("{prefix}{}", path.to_uppercase().replace('.', "_"))
}

/// Applies every `KAIROS_`-prefixed override found in `env` to the scalar
/// leaves of `value`.
pub fn apply_env_overrides(value: &mut Value, prefix: &str, env: &HashMap<String, String>) {
    for path in leaf_paths(value) {
        let var_name = env_var_name(prefix, &path);
        if let Some(raw) = env.get(&var_name) {
            let _ = apply_dotted(value, &path, raw);
        }
    }
}

/// Parses a `key=value` CLI `--set` argument.
pub fn parse_key_value(input: &str) -> Result<(String, String), ConfigError> {
    input
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| ConfigError::InvalidOverride(input.to_string()))
}
