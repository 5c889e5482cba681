use anyhow::{bail, Context, Result};
use serde_json::Value;
use sourcewatch::config::WatcherConfig;
use sourcewatch::storage::path_utils;

/// Effective config as JSON: file merged over defaults, secrets masked.
fn effective() -> Result<Value> {
    let config = WatcherConfig::load_from(&path_utils::config_path());
    let mut value = serde_json::to_value(&config)?;
    if let Some(token) = value.pointer_mut("/timeline/bearer_token") {
        *token = Value::String("********".into());
    }
    Ok(value)
}

/// `config show` — display the full config.
pub fn run_show() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&effective()?)?);
    Ok(())
}

/// `config get <key>` — display a single config value.
///
/// Key uses dot notation: `feed.max_parallel`, `notifier.mode`
pub fn run_get(key: &str) -> Result<()> {
    let config = effective()?;
    match resolve_path(&config, key) {
        Some(v) => println!("{}", serde_json::to_string_pretty(v)?),
        None => bail!("Key not found: {}", key),
    }
    Ok(())
}

/// `config set <key> <value>` — edit `config.json`.
///
/// Value is parsed as JSON (bool, number, string), falling back to a plain
/// string. The result must still deserialize as a `WatcherConfig`; the file
/// is rewritten from that config, so omitted keys are filled with defaults.
pub fn run_set(key: &str, value: &str) -> Result<()> {
    let config_path = path_utils::config_path();

    let mut config: Value = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content).unwrap_or(serde_json::json!({}))
    } else {
        serde_json::json!({})
    };

    let parsed: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    set_path(&mut config, key, parsed.clone())?;

    let validated: WatcherConfig =
        serde_json::from_value(config).with_context(|| format!("Invalid value for {}", key))?;
    validated.save()?;

    println!("{} = {}", key, serde_json::to_string(&parsed)?);
    Ok(())
}

/// Resolve a dot-separated path in a JSON value.
fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Set a value at a dot-separated path, creating intermediate objects as needed.
fn set_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        bail!("Empty key path");
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = serde_json::json!({});
        }
        let Some(map) = current.as_object_mut() else {
            bail!("Cannot descend into {}", segment);
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }

    if !current.is_object() {
        *current = serde_json::json!({});
    }
    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        None => bail!("Cannot set {}", path),
    }
}
