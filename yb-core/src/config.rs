//! Configuration file management for yb-decode.
//!
//! Reads/writes `~/.yb-decode/config.yaml` with output rendering,
//! track analysis, and log filter settings.

use std::path::PathBuf;

use crate::types::YbError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub output: OutputConfig,
    pub analysis: AnalysisConfig,
    /// `tracing` filter directive, e.g. `"warn"` or `"yb_core=debug"`.
    pub log: Option<String>,
}

/// Which moment fields the JSON output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSet {
    /// `dtf`, `lat`, `lon`, `at` only.
    Reference,
    /// Every decoded field.
    Full,
}

impl FieldSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSet::Reference => "reference",
            FieldSet::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reference" => Some(FieldSet::Reference),
            "full" => Some(FieldSet::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub fields: FieldSet,
    pub pretty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub min_speed_kts: f64,
    pub t_min: Option<u32>,
    pub t_max: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: OutputConfig {
                fields: FieldSet::Reference,
                pretty: true,
            },
            analysis: AnalysisConfig {
                min_speed_kts: 0.0,
                t_min: None,
                t_max: None,
            },
            log: None,
        }
    }
}

/// Get the config directory path (`~/.yb-decode/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".yb-decode")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.yb-decode/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &std::path::Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(_) => Config::default(),
    }
}

/// Save config to `~/.yb-decode/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, YbError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| YbError::Config(e.to_string()))?;

    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path.
pub fn save_config_to(config: &Config, path: &std::path::Path) -> Result<(), YbError> {
    std::fs::write(path, serialize_config(config)).map_err(|e| YbError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys are ignored.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            if val.is_empty() {
                current_section = Some(key.to_string());
            } else {
                current_section = None;
                if key == "log" {
                    config.log = parse_string_value(val);
                }
            }
            continue;
        }

        match current_section.as_deref() {
            Some("output") => match key {
                "fields" => {
                    if let Some(f) = parse_string_value(val).as_deref().and_then(FieldSet::parse) {
                        config.output.fields = f;
                    }
                }
                "pretty" => {
                    if let Ok(v) = val.parse::<bool>() {
                        config.output.pretty = v;
                    }
                }
                _ => {}
            },
            Some("analysis") => match key {
                "min_speed_kts" => {
                    if let Some(v) = parse_float_value(val) {
                        config.analysis.min_speed_kts = v;
                    }
                }
                "t_min" => config.analysis.t_min = parse_time_value(val),
                "t_max" => config.analysis.t_max = parse_time_value(val),
                _ => {}
            },
            _ => {}
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

fn parse_time_value(val: &str) -> Option<u32> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# yb-decode configuration".to_string(), String::new()];

    lines.push("output:".into());
    lines.push(format!("  fields: {}", config.output.fields.as_str()));
    lines.push(format!("  pretty: {}", config.output.pretty));
    lines.push(String::new());

    lines.push("analysis:".into());
    lines.push(format!("  min_speed_kts: {}", config.analysis.min_speed_kts));
    for (key, val) in [("t_min", config.analysis.t_min), ("t_max", config.analysis.t_max)] {
        match val {
            Some(v) => lines.push(format!("  {key}: {v}")),
            None => lines.push(format!("  {key}: null")),
        }
    }
    lines.push(String::new());

    match &config.log {
        Some(filter) => lines.push(format!("log: \"{filter}\"")),
        None => lines.push("log: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
