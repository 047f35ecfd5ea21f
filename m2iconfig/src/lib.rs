//! # mpd2irc Configuration Module
//!
//! This module provides configuration management for mpd2irc, including:
//! - Loading configuration from a YAML file
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters with defaults
//!
//! The configuration is loaded once by the binary and handed over to the
//! components that need it; there is no global instance.
//!
//! ## Usage
//!
//! ```no_run
//! use m2iconfig::Config;
//!
//! let config = Config::load_config(None)?;
//! let level = config.get_log_min_level();
//! let port = config.get_u64_or(&["mpd", "port"], 6600);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use serde_yaml::Mapping;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{info, warn};

// Chiffrement des mots de passe stockés dans le fichier
pub mod encryption;

pub use serde_yaml::Value;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("mpd2irc.yaml");

const ENV_CONFIG_FILE: &str = "MPD2IRC_CONFIG";
const ENV_PREFIX: &str = "MPD2IRC_CONFIG__";

const LOCAL_CONFIG_FILE: &str = "mpd2irc.yaml";
const SYSTEM_CONFIG_FILE: &str = "/etc/mpd2irc.yaml";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Macro to generate a getter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            self.get_bool_or($path, $default)
        }
    };
}

/// Macro to generate a getter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            self.get_string_or($path, $default)
        }
    };
}

/// Configuration manager for mpd2irc
///
/// This structure holds the merged configuration tree:
/// - the embedded default configuration
/// - the external YAML file, if one was found
/// - environment variable overrides (`MPD2IRC_CONFIG__SECTION__KEY`)
///
/// Keys are case-insensitive: every key is lower-cased on load and on lookup.
#[derive(Debug)]
pub struct Config {
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.snapshot();
        Self {
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds the configuration file by trying different locations in order
    ///
    /// 1. The `MPD2IRC_CONFIG` environment variable
    /// 2. `mpd2irc.yaml` in the current directory
    /// 3. `mpd2irc/config.yaml` in the user's configuration directory
    /// 4. `/etc/mpd2irc.yaml`
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
            info!(env_var = ENV_CONFIG_FILE, path = %env_path, "Trying to load config from env");
            return Some(PathBuf::from(env_path));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        if let Some(dir) = dirs::config_dir() {
            let user = dir.join("mpd2irc").join("config.yaml");
            if user.exists() {
                return Some(user);
            }
        }

        let system = PathBuf::from(SYSTEM_CONFIG_FILE);
        if system.exists() {
            return Some(system);
        }

        None
    }

    /// Loads the configuration
    ///
    /// This method:
    /// 1. Determines the configuration file (`explicit` wins over the search order)
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external file if present
    /// 4. Applies environment variable overrides
    ///
    /// # Errors
    ///
    /// Fails if an explicitly requested file cannot be read, or if any YAML
    /// document is malformed.
    pub fn load_config(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(anyhow!("Config file {} does not exist", p.display()));
                }
                Some(p.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let external = match &path {
            Some(p) => match fs::read(p) {
                Ok(data) => {
                    info!(config_file = %p.display(), "Loaded config file");
                    Some(serde_yaml::from_slice::<Value>(&data)?)
                }
                Err(err) if explicit.is_some() => {
                    return Err(anyhow!("Cannot read config file {}: {}", p.display(), err));
                }
                Err(err) => {
                    warn!(config_file = %p.display(), "Cannot read config file ({}), using defaults", err);
                    None
                }
            },
            None => {
                info!("No config file found, using default embedded config");
                None
            }
        };

        let mut config = Self::build(external)?;
        config.path = path;
        config.apply_overrides(env::vars());
        Ok(config)
    }

    /// Builds a configuration from a YAML document merged over the defaults
    ///
    /// Environment variables are not consulted.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let external: Value = serde_yaml::from_str(yaml)?;
        Self::build(Some(external))
    }

    fn build(external: Option<Value>) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(external) = external {
            // Un document vide donne Null : on garde les valeurs par défaut
            if !external.is_null() {
                merge_yaml(&mut default_value, &Self::lower_keys_value(external));
            }
        }

        Ok(Config {
            path: None,
            data: Mutex::new(Self::lower_keys_value(default_value)),
        })
    }

    /// Path of the file the configuration was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn snapshot(&self) -> Value {
        match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies `MPD2IRC_CONFIG__A__B=value` overrides from the given variables
    ///
    /// The value is parsed as a YAML scalar, so numbers and booleans keep
    /// their type.
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let data = match self.data.get_mut() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (key, value) in vars {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let key_path = rest.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(data, &key_path, yaml_value) {
                    warn!(env_var = %key, "Ignoring config override: {}", err);
                }
            }
        }
    }

    /// Sets a configuration value at the specified path
    ///
    /// The change only lives in memory.
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["irc", "nick"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))?;
        Self::set_value_internal(&mut data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Returns
    ///
    /// The YAML value, or an error if the path doesn't exist
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self
            .data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads a string, falling back to `default` when absent or not a scalar
    ///
    /// Numbers and booleans are rendered as text, `null` counts as absent.
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            Ok(Value::Bool(b)) => b.to_string(),
            Ok(Value::Null) | Err(_) => default.to_string(),
            Ok(_) => {
                warn!(key = %path.join("."), "Expected a string, using default");
                default.to_string()
            }
        }
    }

    /// Reads an unsigned integer, falling back to `default`
    ///
    /// Strings holding a number are accepted.
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => match s.trim().parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(key = %path.join("."), value = %s, "Invalid number, using default {}", default);
                    default
                }
            },
            Ok(Value::Null) | Err(_) => default,
            Ok(other) => {
                warn!(key = %path.join("."), ?other, "Expected a number, using default {}", default);
                default
            }
        }
    }

    /// Reads a boolean, falling back to `default`
    ///
    /// The strings `true/false`, `yes/no`, `on/off` and `1/0` are accepted.
    pub fn get_bool_or(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            Ok(Value::Number(n)) => n.as_u64().map(|v| v != 0).unwrap_or(default),
            Ok(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => {
                    warn!(key = %path.join("."), value = %s, "Invalid boolean, using default {}", default);
                    default
                }
            },
            _ => default,
        }
    }

    /// Reads a secret, transparently decrypting `encrypted:` values
    ///
    /// An empty value yields `None`.
    pub fn get_password(&self, path: &[&str]) -> Result<Option<String>> {
        let raw = self.get_string_or(path, "");
        if raw.is_empty() {
            return Ok(None);
        }
        let clear = encryption::get_password(&raw)
            .map_err(|e| anyhow!("Failed to decrypt {}: {}", path.join("."), e))?;
        Ok(Some(clear))
    }

    /// Only scalars are typed; `#radio` or `[a]` stay the literal text.
    fn convert_env_value(value: &str) -> Value {
        match serde_yaml::from_str::<Value>(value) {
            Ok(parsed @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => parsed,
            Ok(Value::Null) if matches!(value.trim(), "" | "~" | "null" | "Null" | "NULL") => {
                Value::Null
            }
            _ => Value::String(value.to_string()),
        }
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        let new_val = Self::lower_keys_value(v);
                        new_map.insert(new_key, new_val);
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    impl_string_config!(
        get_log_min_level,
        &["logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        &["logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_loaded() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.get_u64_or(&["mpd", "port"], 0), 6600);
        assert_eq!(config.get_string_or(&["mpd", "host"], ""), "localhost");
        assert_eq!(config.get_u64_or(&["reconnect", "delay_secs"], 0), 30);
        assert!(config.get_bool_or(&["general", "announce"], false));
        assert_eq!(config.get_log_min_level(), "INFO");
        assert!(config.get_log_enable_console());
    }

    #[test]
    fn test_external_file_is_merged_over_defaults() {
        let config = Config::from_yaml_str(
            "IRC:\n  Host: irc.example.org\n  channel: \"#music\"\nmpd:\n  port: 6601\n",
        )
        .unwrap();
        assert_eq!(config.get_string_or(&["irc", "host"], ""), "irc.example.org");
        assert_eq!(config.get_string_or(&["irc", "channel"], ""), "#music");
        assert_eq!(config.get_u64_or(&["mpd", "port"], 0), 6601);
        // Les clés voisines gardent leur valeur par défaut
        assert_eq!(config.get_string_or(&["irc", "nick"], ""), "mpd2irc");
        assert_eq!(config.get_u64_or(&["irc", "port"], 0), 6667);
    }

    #[test]
    fn test_overrides_keep_yaml_types() {
        let mut config = Config::from_yaml_str("").unwrap();
        config.apply_overrides(vec![
            ("MPD2IRC_CONFIG__IRC__TLS".to_string(), "true".to_string()),
            ("MPD2IRC_CONFIG__MPD__PORT".to_string(), "7000".to_string()),
            ("MPD2IRC_CONFIG__IRC__CHANNEL".to_string(), "#radio".to_string()),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ]);
        assert!(config.get_bool_or(&["irc", "tls"], false));
        assert_eq!(config.get_u64_or(&["mpd", "port"], 0), 7000);
        assert_eq!(config.get_string_or(&["irc", "channel"], ""), "#radio");
    }

    #[test]
    fn test_overrides_keep_non_scalar_text() {
        let mut config = Config::from_yaml_str("irc:\n  channel: \"#chan\"\n").unwrap();
        config.apply_overrides(vec![
            ("MPD2IRC_CONFIG__IRC__CHANNEL".to_string(), "#radio".to_string()),
            ("MPD2IRC_CONFIG__IRC__NICK".to_string(), "[bot]".to_string()),
            ("MPD2IRC_CONFIG__IRC__REALNAME".to_string(), "dj: radio".to_string()),
            ("MPD2IRC_CONFIG__MPD__PASSWORD".to_string(), "~".to_string()),
        ]);
        assert_eq!(config.get_string_or(&["irc", "channel"], ""), "#radio");
        assert_eq!(config.get_string_or(&["irc", "nick"], ""), "[bot]");
        assert_eq!(config.get_string_or(&["irc", "realname"], ""), "dj: radio");
        assert_eq!(config.get_value(&["mpd", "password"]).unwrap(), Value::Null);
    }

    #[test]
    fn test_lenient_scalar_getters() {
        let config =
            Config::from_yaml_str("mpd:\n  port: \"6610\"\ngeneral:\n  announce: \"off\"\n")
                .unwrap();
        assert_eq!(config.get_u64_or(&["mpd", "port"], 0), 6610);
        assert!(!config.get_bool_or(&["general", "announce"], true));
        assert_eq!(config.get_u64_or(&["does", "not", "exist"], 42), 42);
    }

    #[test]
    fn test_set_and_get_value() {
        let config = Config::from_yaml_str("").unwrap();
        config
            .set_value(&["IRC", "Nick"], Value::String("jukebox".into()))
            .unwrap();
        assert_eq!(config.get_string_or(&["irc", "nick"], ""), "jukebox");
        assert!(config.get_value(&["irc", "missing"]).is_err());
    }

    #[test]
    fn test_get_password_plaintext_and_empty() {
        let config = Config::from_yaml_str("mpd:\n  password: hunter2\n").unwrap();
        assert_eq!(
            config.get_password(&["mpd", "password"]).unwrap(),
            Some("hunter2".to_string())
        );
        assert_eq!(config.get_password(&["irc", "password"]).unwrap(), None);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "irc:\n  host: chat.local\n").unwrap();

        let config = Config::load_config(Some(&path)).unwrap();
        assert_eq!(config.path(), Some(path.as_path()));
        assert_eq!(config.get_string_or(&["irc", "host"], ""), "chat.local");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(Config::load_config(Some(&path)).is_err());
    }
}
