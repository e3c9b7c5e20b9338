// src/config/handles.rs
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const ENV_HANDLES_PATH: &str = "HANDLES_PATH";

/// Split a comma-separated handle list (`"alice, @bob"` -> `["alice", "bob"]`).
pub fn parse_handle_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string))
}

/// Fallback locations tried in order when no explicit path is given.
const DEFAULT_HANDLE_FILES: [&str; 2] = ["config/handles.toml", "config/handles.json"];

/// Load handles from a `.toml` (`handles = [...]`) or `.json` (array) file.
pub fn load_handles_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading handles from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_handles(&content, &ext).with_context(|| format!("parsing {}", path.display()))
}

/// `explicit` (normally `$HANDLES_PATH`) must exist when set; otherwise the first existing
/// default file is used. Nothing on disk yields an empty list.
pub fn load_handles_default(explicit: Option<&str>) -> Result<Vec<String>> {
    if let Some(p) = explicit {
        let path = Path::new(p);
        if !path.exists() {
            return Err(anyhow!("{ENV_HANDLES_PATH} points to non-existent path {p}"));
        }
        return load_handles_from(path);
    }
    match DEFAULT_HANDLE_FILES.into_iter().map(Path::new).find(|p| p.exists()) {
        Some(path) => load_handles_from(path),
        None => Ok(Vec::new()),
    }
}

fn parse_handles(s: &str, ext: &str) -> Result<Vec<String>> {
    match ext {
        "toml" => parse_toml(s),
        "json" => parse_json(s),
        other => Err(anyhow!(
            "unsupported handle file extension {other:?} (expected .toml or .json)"
        )),
    }
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlHandles {
        handles: Vec<String>,
    }
    let v: TomlHandles = toml::from_str(s)?;
    Ok(clean_list(v.handles))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, strip '@', drop empties and case-insensitive duplicates. Keeps configured order.
fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let t = it.trim().trim_start_matches('@').trim();
        if !t.is_empty() && seen.insert(t.to_ascii_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}
