use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;

/// Read-only view over the layered YAML configuration.
///
/// `config.yml` holds tuning knobs; `secrets.yaml` holds provider credentials
/// and is deep-merged on top so secret keys win. Missing or malformed files
/// degrade to an empty mapping, letting the in-code defaults apply.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("ANSERA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    pub fn load_config(&self) -> Value {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        deep_merge(&public_config, &secrets_config)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => match value {
                Value::Object(_) => value,
                _ => Value::Object(Map::new()),
            },
            Err(_) => Value::Object(Map::new()),
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

/// Walks a dotted path (`"chat.top_k"`) through nested config objects.
pub fn lookup<'a>(config: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = config;
    for segment in dotted.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

pub fn lookup_str(config: &Value, dotted: &str, default: &str) -> String {
    lookup(config, dotted)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

pub fn lookup_u64(config: &Value, dotted: &str, default: u64) -> u64 {
    lookup(config, dotted).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub fn lookup_f64(config: &Value, dotted: &str, default: f64) -> f64 {
    lookup(config, dotted).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub fn lookup_string_list(config: &Value, dotted: &str) -> Option<Vec<String>> {
    let items = lookup(config, dotted)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn lookup_walks_nested_paths() {
        let config = json!({
            "providers": {
                "openai": { "chat_model": "gpt-4-turbo-preview" }
            },
            "chat": { "top_k": 3, "temperature": 0.7 }
        });

        assert_eq!(
            lookup_str(&config, "providers.openai.chat_model", "fallback"),
            "gpt-4-turbo-preview"
        );
        assert_eq!(lookup_u64(&config, "chat.top_k", 5), 3);
        assert_eq!(lookup_f64(&config, "chat.temperature", 0.0), 0.7);
        assert_eq!(lookup_u64(&config, "chat.missing", 42), 42);
        assert_eq!(lookup_str(&config, "nope.nothing", "d"), "d");
    }

    #[test]
    fn lookup_string_list_filters_non_strings() {
        let config = json!({ "sentiment": { "urgency_keywords": ["urgent", 5, "asap"] } });

        assert_eq!(
            lookup_string_list(&config, "sentiment.urgency_keywords"),
            Some(vec!["urgent".to_string(), "asap".to_string()])
        );
        assert_eq!(lookup_string_list(&config, "sentiment.other"), None);
    }
}
