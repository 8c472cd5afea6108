//! Durable configuration.
//!
//! The configuration lives in a literal declaration file (see [`crate::literal`])
//! under the name `DATABASE`. [`ConfigStore`] loads, validates, updates and
//! creates that file; [`ConfigRecord`] is the typed result.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::literal::{Literal, find_declaration, render_declaration};
use crate::utils::fs::write_atomically;

/// Name of the declaration that holds the configuration record.
pub const DECLARATION_NAME: &str = "DATABASE";

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Endpoint used by `--beta`.
pub const BETA_BASE_URL: &str = "https://beta.api.deepseek.com/beta";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Model used by `--reasoner`.
pub const REASONER_MODEL: &str = "deepseek-reasoner";

/// Default sampling temperature for new configurations.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Keys every configuration record must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["api_key", "base_url", "model", "temperature", "memory"];

const STREAM_KEY: &str = "stream";

const CONFIG_FILE: &str = "settings.conf";
const LATEST_FILE: &str = "latest.json";

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "DSCHAT_HOME";

/////////////////////////////////////////// ChatHome ///////////////////////////////////////////

/// The directory holding the configuration, the latest transcript and archives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatHome {
    root: PathBuf,
}

impl ChatHome {
    /// Uses `root` as the home directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the home directory from `$DSCHAT_HOME`, falling back to the
    /// directory containing the running executable.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        let exe = env::current_exe()
            .map_err(|err| Error::io("failed to locate the running executable", err))?;
        let root = exe.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(root))
    }

    /// Path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of the latest-transcript file.
    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    /// Directory archives are written to.
    pub fn archive_dir(&self) -> PathBuf {
        self.root.clone()
    }
}

///////////////////////////////////////// ConfigRecord /////////////////////////////////////////

/// A validated configuration record.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigRecord {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL of the chat completion API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether the transcript persists across runs.
    pub memory: bool,
    /// Whether responses are streamed. Defaults to true when absent from the file.
    pub stream: bool,
    /// Keys this client does not interpret, in file order.
    pub extra: Vec<(String, Literal)>,
}

impl ConfigRecord {
    /// Validates a parsed declaration value.
    pub fn from_literal(value: &Literal) -> Result<Self> {
        let entries = value.as_map().ok_or_else(|| {
            Error::config_parse(
                format!(
                    "{DECLARATION_NAME} must be a mapping, found a {}",
                    value.kind()
                ),
                None,
                None,
            )
        })?;
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| lookup(entries, key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::config_incomplete(missing));
        }

        let base_url = string_value(entries, "base_url")?;
        validate_base_url(&base_url)?;
        let temperature = match lookup(entries, "temperature") {
            Some(value) => value.as_f64().ok_or_else(|| mismatch("temperature", "number", value))?,
            None => return Err(Error::config_incomplete(vec!["temperature".to_string()])),
        };
        let stream = match lookup(entries, STREAM_KEY) {
            Some(_) => bool_value(entries, STREAM_KEY)?,
            None => true,
        };
        let extra = entries
            .iter()
            .filter(|(k, _)| !REQUIRED_KEYS.contains(&k.as_str()) && k != STREAM_KEY)
            .cloned()
            .collect();

        Ok(Self {
            api_key: string_value(entries, "api_key")?,
            base_url,
            model: string_value(entries, "model")?,
            temperature,
            memory: bool_value(entries, "memory")?,
            stream,
            extra,
        })
    }

    /// Every key/value pair: required keys, extra keys, then `stream`.
    pub fn entries(&self) -> Vec<(String, Literal)> {
        let mut entries = vec![
            ("api_key".to_string(), Literal::from(self.api_key.as_str())),
            ("base_url".to_string(), Literal::from(self.base_url.as_str())),
            ("model".to_string(), Literal::from(self.model.as_str())),
            ("temperature".to_string(), Literal::Float(self.temperature)),
            ("memory".to_string(), Literal::Bool(self.memory)),
        ];
        entries.extend(self.extra.iter().cloned());
        entries.push((STREAM_KEY.to_string(), Literal::Bool(self.stream)));
        entries
    }

    /// Returns true if the configured model emits reasoning tokens.
    pub fn is_reasoning_model(&self) -> bool {
        is_reasoning_model(&self.model)
    }

    /// Writes every key/value pair and the transcript location to `out`.
    pub fn show(&self, transcript_path: &Path, out: &mut dyn Write) -> io::Result<()> {
        for (key, value) in self.entries() {
            match value {
                Literal::Str(s) => writeln!(out, "{key}: {s}")?,
                other => writeln!(out, "{key}: {other}")?,
            }
        }
        writeln!(out, "transcript: {}", transcript_path.display())
    }
}

fn lookup<'a>(entries: &'a [(String, Literal)], key: &str) -> Option<&'a Literal> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn mismatch(key: &str, expected: &str, found: &Literal) -> Error {
    Error::config_invalid(key, format!("expected a {expected}, found a {}", found.kind()))
}

fn string_value(entries: &[(String, Literal)], key: &str) -> Result<String> {
    let value = lookup(entries, key).ok_or_else(|| Error::config_incomplete(vec![key.to_string()]))?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(key, "string", value))
}

fn bool_value(entries: &[(String, Literal)], key: &str) -> Result<bool> {
    let value = lookup(entries, key).ok_or_else(|| Error::config_incomplete(vec![key.to_string()]))?;
    value.as_bool().ok_or_else(|| mismatch(key, "boolean", value))
}

/// Returns true if `model` names a reasoning variant.
pub fn is_reasoning_model(model: &str) -> bool {
    model.contains("reasoner")
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let url = url::Url::parse(base_url)
        .map_err(|err| Error::config_invalid("base_url", format!("{base_url:?} is not a URL: {err}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(Error::config_invalid(
            "base_url",
            format!("{base_url:?} is not an http(s) URL"),
        ));
    }
    Ok(())
}

///////////////////////////////////////// ConfigStore //////////////////////////////////////////

/// Reads and writes the configuration file.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigMissing`] if the file does not exist.
    /// - [`Error::ConfigParse`] if the file is not a literal declaration file
    ///   with a `DATABASE` mapping.
    /// - [`Error::ConfigIncomplete`] if required keys are missing.
    /// - [`Error::ConfigInvalid`] if a value has the wrong type.
    pub fn load(&self) -> Result<ConfigRecord> {
        ConfigRecord::from_literal(&self.read_value()?)
    }

    /// Merges `partial` into the durable record and rewrites the whole file.
    ///
    /// Later keys overwrite earlier ones; keys not yet present are appended.
    /// The merged record must still validate.
    pub fn update<K: Into<String>>(&self, partial: Vec<(K, Literal)>) -> Result<()> {
        let Literal::Map(mut entries) = self.read_value()? else {
            return Err(Error::config_parse(
                format!("{DECLARATION_NAME} must be a mapping"),
                None,
                None,
            ));
        };
        for (key, value) in partial {
            let key = key.into();
            if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                entries.push((key, value));
            }
        }
        let merged = Literal::Map(entries);
        ConfigRecord::from_literal(&merged)?;
        self.write_value(&merged)?;
        println!("Configuration updated: {}", self.path.display());
        Ok(())
    }

    /// Writes a brand-new configuration, replacing any existing file.
    pub fn create(
        &self,
        api_key: &str,
        base_url: &str,
        model: &str,
        temperature: f64,
        memory: bool,
    ) -> Result<ConfigRecord> {
        if !temperature.is_finite() {
            return Err(Error::config_invalid(
                "temperature",
                format!("{temperature} is not a finite number"),
            ));
        }
        validate_base_url(base_url)?;
        let value = Literal::Map(vec![
            ("api_key".to_string(), Literal::from(api_key)),
            ("base_url".to_string(), Literal::from(base_url)),
            ("model".to_string(), Literal::from(model)),
            ("temperature".to_string(), Literal::Float(temperature)),
            ("memory".to_string(), Literal::Bool(memory)),
        ]);
        self.write_value(&value)?;
        println!("Created configuration file: {}", self.path.display());
        ConfigRecord::from_literal(&value)
    }

    /// Writes a new configuration with the default endpoint and model and
    /// memory disabled.
    pub fn create_default(&self, api_key: &str, temperature: f64) -> Result<ConfigRecord> {
        self.create(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL, temperature, false)
    }

    fn read_value(&self) -> Result<Literal> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::config_missing(&self.path));
            }
            Err(err) => {
                return Err(Error::io(
                    format!("failed to read {}", self.path.display()),
                    err,
                ));
            }
        };
        find_declaration(&content, DECLARATION_NAME)
    }

    fn write_value(&self, value: &Literal) -> Result<()> {
        let content = render_declaration(DECLARATION_NAME, value);
        write_atomically(&self.path, content.as_bytes())
            .map_err(|err| Error::io(format!("failed to write {}", self.path.display()), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "DATABASE = {'api_key': 'x', 'base_url': 'https://api.deepseek.com', \
                         'model': 'deepseek-chat', 'temperature': 0.7, 'memory': True}\n";

    fn store_with(content: &str) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.conf");
        fs::write(&path, content).unwrap();
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn load_valid_config_defaults_stream() {
        let (_dir, store) = store_with(VALID);
        let config = store.load().unwrap();
        assert_eq!(config.api_key, "x");
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.temperature, 0.7);
        assert!(config.memory);
        assert!(config.stream);
        assert!(config.extra.is_empty());
        assert!(!config.is_reasoning_model());
    }

    #[test]
    fn load_uses_first_declaration() {
        let (_dir, store) = store_with(&format!("{VALID}DATABASE = {{'api_key': 'shadow'}}\n"));
        assert_eq!(store.load().unwrap().api_key, "x");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.conf"));
        assert!(matches!(store.load(), Err(Error::ConfigMissing { .. })));
    }

    #[test]
    fn load_incomplete_names_missing_keys() {
        let (_dir, store) = store_with("DATABASE = {'api_key': 'x', 'model': 'm'}\n");
        match store.load() {
            Err(Error::ConfigIncomplete { missing }) => {
                assert_eq!(missing, vec!["base_url", "memory", "temperature"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn load_rejects_code() {
        let (_dir, store) = store_with("DATABASE = __import__('os').system('true')\n");
        assert!(matches!(store.load(), Err(Error::ConfigParse { .. })));
    }

    #[test]
    fn load_rejects_wrong_types() {
        let (_dir, store) = store_with(
            "DATABASE = {'api_key': 'x', 'base_url': 'https://a.example', 'model': 'm', \
             'temperature': 'hot', 'memory': False}\n",
        );
        match store.load() {
            Err(Error::ConfigInvalid { key, .. }) => assert_eq!(key, "temperature"),
            other => panic!("unexpected result: {other:?}"),
        }

        let (_dir, store) = store_with(
            "DATABASE = {'api_key': 'x', 'base_url': 'not a url', 'model': 'm', \
             'temperature': 1, 'memory': False}\n",
        );
        match store.load() {
            Err(Error::ConfigInvalid { key, .. }) => assert_eq!(key, "base_url"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn integer_temperature_is_widened() {
        let (_dir, store) = store_with(
            "DATABASE = {'api_key': 'x', 'base_url': 'https://a.example', 'model': 'm', \
             'temperature': 1, 'memory': False, 'stream': False}\n",
        );
        let config = store.load().unwrap();
        assert_eq!(config.temperature, 1.0);
        assert!(!config.stream);
    }

    #[test]
    fn show_reproduces_every_key() {
        let (_dir, store) = store_with(
            "DATABASE = {'api_key': 'x', 'base_url': 'https://api.deepseek.com', \
             'model': 'deepseek-chat', 'temperature': 0.7, 'memory': True, 'note': 'hi'}\n",
        );
        let config = store.load().unwrap();
        let mut out = Vec::new();
        config
            .show(Path::new("/tmp/dschat/latest.json"), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "api_key: x\n\
             base_url: https://api.deepseek.com\n\
             model: deepseek-chat\n\
             temperature: 0.7\n\
             memory: true\n\
             note: hi\n\
             stream: true\n\
             transcript: /tmp/dschat/latest.json\n"
        );
    }

    #[test]
    fn update_merges_and_preserves_other_keys() {
        let (_dir, store) = store_with(
            "DATABASE = {'api_key': 'x', 'base_url': 'https://api.deepseek.com', \
             'model': 'deepseek-chat', 'temperature': 0.7, 'memory': True, 'note': 'keep'}\n",
        );
        store
            .update(vec![
                ("model", Literal::from(REASONER_MODEL)),
                ("memory", Literal::Bool(false)),
                ("stream", Literal::Bool(false)),
            ])
            .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.model, REASONER_MODEL);
        assert!(!config.memory);
        assert!(!config.stream);
        assert_eq!(config.api_key, "x");
        assert_eq!(config.extra, vec![("note".to_string(), Literal::from("keep"))]);
        assert!(!store.path().with_file_name("settings.conf.tmp").exists());
    }

    #[test]
    fn update_rejects_invalid_merge_and_keeps_file() {
        let (_dir, store) = store_with(VALID);
        let err = store
            .update(vec![("temperature", Literal::from("warm"))])
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), VALID);
    }

    #[test]
    fn update_requires_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.conf"));
        let err = store
            .update(vec![("model", Literal::from("m"))])
            .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }

    #[test]
    fn create_overwrites_existing_file() {
        let (_dir, store) = store_with("this is not a config");
        let created = store.create_default("mykey", DEFAULT_TEMPERATURE).unwrap();
        assert_eq!(created.api_key, "mykey");

        let loaded = store.load().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.base_url, DEFAULT_BASE_URL);
        assert_eq!(loaded.model, DEFAULT_MODEL);
        assert_eq!(loaded.temperature, 0.7);
        assert!(!loaded.memory);
        assert!(loaded.stream);
    }

    #[test]
    fn create_rejects_non_finite_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("settings.conf"));
        assert!(store.create_default("k", f64::NAN).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn home_paths() {
        let home = ChatHome::new("/opt/dschat");
        assert_eq!(home.config_path(), Path::new("/opt/dschat/settings.conf"));
        assert_eq!(home.latest_path(), Path::new("/opt/dschat/latest.json"));
        assert_eq!(home.archive_dir(), Path::new("/opt/dschat"));
    }
}
