//! Minimal `.env` parser (lines as `KEY=VALUE`), grounded in the teacher's
//! `config::dotenv` module: same comment/quote/escape rules, same
//! "missing file -> empty map" contract.

use std::collections::HashMap;
use std::path::Path;

fn dotenv_path(override_dir: Option<&Path>) -> Option<std::path::PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    (path.exists() && path.is_file()).then_some(path)
}

fn parse(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim().to_string();
        if key.is_empty() {
            continue;
        }
        let value = v.trim().to_string();
        let value = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else {
            value
        };
        let value = value
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .map(str::to_string)
            .unwrap_or(value);
        out.insert(key, value);
    }
    out
}

/// Loads `.env` from `override_dir` or the current directory. A missing file
/// returns an empty map, not an error.
pub fn load(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let Some(path) = dotenv_path(override_dir) else {
        return Ok(HashMap::new());
    };
    Ok(parse(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let m = parse("FOO=bar\nBAZ=quux\n");
        assert_eq!(m.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(m.get("BAZ"), Some(&"quux".to_string()));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let m = parse("\n# comment\nKEY=val\n  \n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("KEY"), Some(&"val".to_string()));
    }

    #[test]
    fn strips_matching_quotes() {
        assert_eq!(parse(r#"KEY="hello world""#).get("KEY"), Some(&"hello world".to_string()));
        assert_eq!(parse("KEY='single'").get("KEY"), Some(&"single".to_string()));
    }

    #[test]
    fn missing_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(dir.path())).unwrap().is_empty());
    }

    #[test]
    fn reads_env_file_from_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "KAIROS_LOG_LEVEL=debug\n").unwrap();
        let m = load(Some(dir.path())).unwrap();
        assert_eq!(m.get("KAIROS_LOG_LEVEL"), Some(&"debug".to_string()));
    }
}
