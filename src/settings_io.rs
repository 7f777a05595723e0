use anyhow::Context;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::settings::Settings;

pub fn spoutcap_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("SpoutCap"))
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (k, v) in overlay_obj {
                match base_obj.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        base_obj.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Drop values serde would reject so the defaults apply instead of losing
/// the whole file.
pub fn sanitize_settings_json(value: &mut Value) {
    let Value::Object(obj) = value else {
        return;
    };

    // Enum strings are matched case-insensitively and rewritten exactly
    for (key, variants) in [
        ("initial_mode", &["Desktop", "Region", "Window"][..]),
        ("pick_button", &["Left", "Right", "Middle"][..]),
    ] {
        match obj.get(key).cloned() {
            Some(Value::String(raw)) => match variants.iter().find(|v| v.eq_ignore_ascii_case(&raw)) {
                Some(variant) => {
                    obj.insert(key.to_string(), Value::String(variant.to_string()));
                }
                None => {
                    obj.remove(key);
                }
            },
            Some(_) => {
                obj.remove(key);
            }
            None => {}
        }
    }

    // Empty channel names are not valid mapping names
    if let Some(channels) = obj.get_mut("channels").and_then(|v| v.as_object_mut()) {
        channels.retain(|_, v| v.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false));
    }

    if let Some(filter) = obj.get_mut("target_filter").and_then(|v| v.as_object_mut()) {
        if !filter
            .get("excluded_classes")
            .map(|v| v.is_array())
            .unwrap_or(false)
        {
            filter.remove("excluded_classes");
        }
    }
}

pub fn bootstrap_settings_if_missing(config_dir: &Path) {
    let settings_path = config_dir.join("settings.json");
    if settings_path.exists() {
        return;
    }

    if let Err(e) = persist_settings_to_dir(config_dir, &Settings::default()) {
        log::warn!("Failed to bootstrap settings.json: {:#}", e);
    }
}

pub fn persist_settings_to_dir(dir: &Path, settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let settings_path = dir.join("settings.json");
    let pretty = serde_json::to_string_pretty(settings).context("serializing settings")?;
    std::fs::write(&settings_path, pretty)
        .with_context(|| format!("writing {}", settings_path.display()))
}

pub fn load_settings_from_disk(dir: &Path) -> Settings {
    let _ = std::fs::create_dir_all(dir);

    // First-run bootstrap: seed defaults only if missing.
    bootstrap_settings_if_missing(dir);

    let settings_path = dir.join("settings.json");

    let raw = std::fs::read_to_string(&settings_path).unwrap_or_else(|_| "{}".to_string());
    let mut value: Value = serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("settings.json is not valid JSON, using defaults: {}", e);
        serde_json::json!({})
    });

    sanitize_settings_json(&mut value);

    // Merge onto current defaults so missing keys don't break deserialization.
    let mut merged =
        serde_json::to_value(Settings::default()).unwrap_or_else(|_| serde_json::json!({}));
    merge_json(&mut merged, value);

    match serde_json::from_value::<Settings>(merged) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Invalid settings.json, using defaults: {}", e);
            Settings::default()
        }
    }
}
