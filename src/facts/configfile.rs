//! Config file handlers
//!
//! A handler names a file format adapter (and optionally a default path)
//! that config requirements and config checks resolve by name through the
//! RunContext registry. Unknown handler names fail at rule-load time.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `key = value` or `key value`, `#`/`;` comments, no sections
    KeyValue,
    /// ini-style with `[section]` headers
    Ini,
}

/// A named format adapter with an optional default file path
/// (relative to the data root).
#[derive(Debug, Clone)]
pub struct ConfigHandler {
    pub name: String,
    pub format: ConfigFormat,
    pub default_path: Option<PathBuf>,
}

/// Registry of config handlers, keyed by name.
pub struct ConfigHandlerRegistry {
    handlers: HashMap<String, ConfigHandler>,
}

impl Default for ConfigHandlerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register("keyvalue", ConfigFormat::KeyValue, None);
        registry.register("ini", ConfigFormat::Ini, None);
        registry.register("sysctl", ConfigFormat::KeyValue, Some("etc/sysctl.conf"));
        registry
    }
}

impl ConfigHandlerRegistry {
    pub fn register(&mut self, name: &str, format: ConfigFormat, default_path: Option<&str>) {
        self.handlers.insert(
            name.to_string(),
            ConfigHandler {
                name: name.to_string(),
                format,
                default_path: default_path.map(PathBuf::from),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ConfigHandler> {
        self.handlers.get(name)
    }
}

impl ConfigHandler {
    /// Load and parse the handler's file. A missing file is an empty
    /// config, not an error.
    pub fn load(&self, data_root: &Path, path_override: Option<&Path>) -> ConfigFile {
        let relative = path_override
            .map(Path::to_path_buf)
            .or_else(|| self.default_path.clone());
        let Some(relative) = relative else {
            debug!("config handler '{}' has no path to read", self.name);
            return ConfigFile::default();
        };
        let path = data_root.join(relative);
        match fs::read_to_string(&path) {
            Ok(content) => ConfigFile::parse(&content, self.format),
            Err(_) => {
                debug!("no config file at {}", path.display());
                ConfigFile::default()
            }
        }
    }
}

/// One parsed config entry.
#[derive(Debug, Clone)]
struct ConfigEntry {
    section: Option<String>,
    key: String,
    value: String,
}

/// A parsed config file queryable by key (and section for ini formats).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    entries: Vec<ConfigEntry>,
}

impl ConfigFile {
    pub fn parse(content: &str, format: ConfigFormat) -> Self {
        let mut entries = Vec::new();
        let mut section: Option<String> = None;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if format == ConfigFormat::Ini && line.starts_with('[') && line.ends_with(']') {
                section = Some(line[1..line.len() - 1].trim().to_string());
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => match line.split_once(char::is_whitespace) {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => (line, ""),
                },
            };
            if key.is_empty() {
                continue;
            }
            entries.push(ConfigEntry {
                section: section.clone(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        Self { entries }
    }

    /// Last matching entry wins, mirroring how these files are applied.
    pub fn get(&self, key: &str, section: Option<&str>) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key && (section.is_none() || e.section.as_deref() == section))
            .map(|e| e.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyvalue_parse() {
        let cfg = ConfigFile::parse(
            "# tuning\n\
             net.core.rmem_max = 212992\n\
             vm.swappiness=60\n\
             kernel.domainname example.com\n",
            ConfigFormat::KeyValue,
        );
        assert_eq!(cfg.get("net.core.rmem_max", None), Some("212992"));
        assert_eq!(cfg.get("vm.swappiness", None), Some("60"));
        assert_eq!(cfg.get("kernel.domainname", None), Some("example.com"));
        assert_eq!(cfg.get("missing", None), None);
    }

    #[test]
    fn test_ini_sections() {
        let cfg = ConfigFile::parse(
            "[DEFAULT]\n\
             debug = false\n\
             [agent]\n\
             debug = true\n\
             ; trailing comment\n",
            ConfigFormat::Ini,
        );
        assert_eq!(cfg.get("debug", Some("agent")), Some("true"));
        assert_eq!(cfg.get("debug", Some("DEFAULT")), Some("false"));
        // section-less lookup takes the last occurrence
        assert_eq!(cfg.get("debug", None), Some("true"));
    }

    #[test]
    fn test_last_entry_wins() {
        let cfg = ConfigFile::parse(
            "vm.swappiness = 60\nvm.swappiness = 10\n",
            ConfigFormat::KeyValue,
        );
        assert_eq!(cfg.get("vm.swappiness", None), Some("10"));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ConfigHandlerRegistry::default();
        assert!(registry.get("sysctl").is_some());
        assert!(registry.get("ini").is_some());
        assert!(registry.get("nope").is_none());
        assert_eq!(
            registry.get("sysctl").unwrap().default_path.as_deref(),
            Some(Path::new("etc/sysctl.conf"))
        );
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let registry = ConfigHandlerRegistry::default();
        let handler = registry.get("sysctl").unwrap();
        let cfg = handler.load(Path::new("/nonexistent"), None);
        assert!(cfg.is_empty());
    }
}
