//! Load a TOML document from `$XDG_CONFIG_HOME/<app>/config.toml` (or the
//! platform config dir via `dirs::config_dir()` when `XDG_CONFIG_HOME` is
//! unset), grounded in the teacher's `config::xdg_toml` (same lookup, same
//! "missing file -> empty" contract) but returning the raw TOML `Value`
//! instead of an `[env]` map, since `kairos-config` merges a typed config
//! tree rather than process environment variables.

use std::path::PathBuf;

use crate::ConfigError;

fn xdg_config_path(app_name: &str) -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    let path = base.join(app_name).join("config.toml");
    path.exists().then_some(path)
}

/// Returns the parsed TOML document at the app's XDG config path, or `None`
/// if no such file exists.
pub fn load(app_name: &str) -> Result<Option<toml::Value>, ConfigError> {
    let Some(path) = xdg_config_path(app_name) else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(&path).map_err(ConfigError::XdgRead)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_returns_none() {
        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::remove_var("XDG_CONFIG_HOME");
        let result = load("kairos-config-test-nonexistent-app-xyz").unwrap();
        if let Some(p) = prev {
            std::env::set_var("XDG_CONFIG_HOME", p);
        }
        assert!(result.is_none());
    }

    #[test]
    fn reads_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("kairos");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "log_level = \"debug\"\n").unwrap();

        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        let result = load("kairos").unwrap();
        match prev {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        let value = result.unwrap();
        assert_eq!(value.get("log_level").and_then(|v| v.as_str()), Some("debug"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("badkairos");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "not valid [[[\n").unwrap();

        let prev = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        let result = load("badkairos");
        match prev {
            Some(p) => std::env::set_var("XDG_CONFIG_HOME", p),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        assert!(matches!(result, Err(ConfigError::XdgParse(_))));
    }
}
