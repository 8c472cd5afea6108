//! The start-up sequence of the chat tool.
//!
//! [`prepare`] runs everything that happens before the lifecycle guard is
//! installed: `--key`, loading the configuration, applying and persisting
//! overrides, and loading the transcript. [`Prepared::run_actions`] runs the
//! one-shot flags that need the guard (`--new`, then `--status`).

use crate::chat::ChatArgs;
use crate::config::{ChatHome, ConfigRecord, ConfigStore};
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::transcript::TranscriptStore;

/// What [`prepare`] did.
#[derive(Debug)]
pub enum Startup {
    /// `--key` wrote a new configuration. Nothing else runs.
    ConfigCreated(ConfigRecord),
    /// The configuration and transcript are loaded.
    Ready(Prepared),
}

/// A loaded configuration and transcript.
#[derive(Debug)]
pub struct Prepared {
    pub config: ConfigRecord,
    pub transcript: TranscriptStore,
}

/// What to do after [`Prepared::run_actions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Enter the chat loop.
    Chat,
    /// `--status` was given; exit through the guard.
    Exit,
}

/// Runs the start-up steps that precede the lifecycle guard.
///
/// `--key` is handled before the configuration or transcript is read, so it
/// works even when either is broken.
///
/// # Errors
///
/// Configuration errors, and [`Error::TranscriptCorrupt`] when memory is on
/// and the latest transcript cannot be read. The transcript file is never
/// written here.
pub fn prepare(args: &ChatArgs, home: &ChatHome) -> Result<Startup> {
    let store = ConfigStore::new(home.config_path());
    if let Some(key) = &args.key {
        return store
            .create_default(key, args.temperature)
            .map(Startup::ConfigCreated);
    }

    let mut config = store.load()?;
    args.apply(&mut config);
    if args.persist {
        let overrides = args.overrides();
        if !overrides.is_empty() {
            store.update(overrides)?;
        }
    }

    let transcript = TranscriptStore::new(home.latest_path(), home.archive_dir(), config.memory);
    transcript.load_if_enabled()?;
    Ok(Startup::Ready(Prepared { config, transcript }))
}

impl Prepared {
    /// Archives the transcript for `--new`, then prints the configuration for
    /// `--status`.
    pub fn run_actions(&self, args: &ChatArgs, renderer: &mut dyn Renderer) -> Result<NextStep> {
        if args.new {
            let path = self.transcript.archive_and_reset()?;
            renderer.print_info(&format!("Conversation archived to {}", path.display()));
        }
        if args.status {
            let mut status = Vec::new();
            self.config
                .show(self.transcript.latest_path(), &mut status)
                .map_err(|err| Error::io("failed to render the configuration", err))?;
            renderer.print_info(String::from_utf8_lossy(&status).trim_end());
            return Ok(NextStep::Exit);
        }
        Ok(NextStep::Chat)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::render::PlainTextRenderer;
    use crate::types::Message;

    const SETTINGS: &str = "DATABASE = {'api_key': 'x', 'base_url': 'https://api.deepseek.com', \
                            'model': 'deepseek-chat', 'temperature': 0.3, 'memory': True}\n";

    fn home_with(settings: &str) -> (tempfile::TempDir, ChatHome) {
        let dir = tempfile::tempdir().unwrap();
        let home = ChatHome::new(dir.path());
        fs::write(home.config_path(), settings).unwrap();
        (dir, home)
    }

    fn args(flags: &[&str]) -> ChatArgs {
        ChatArgs::parse(flags).unwrap()
    }

    fn ready(startup: Startup) -> Prepared {
        match startup {
            Startup::Ready(prepared) => prepared,
            Startup::ConfigCreated(_) => panic!("expected a loaded configuration"),
        }
    }

    #[test]
    fn key_skips_config_and_transcript() {
        let (_dir, home) = home_with(SETTINGS);
        fs::write(home.latest_path(), "{ not a transcript").unwrap();

        let startup = prepare(&args(&["-k", "mykey"]), &home).unwrap();
        let Startup::ConfigCreated(record) = startup else {
            panic!("expected a new configuration");
        };
        assert_eq!(record.api_key, "mykey");
        assert!(!record.memory);
        assert_eq!(record.temperature, 0.7);

        let loaded = ConfigStore::new(home.config_path()).load().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(
            fs::read_to_string(home.latest_path()).unwrap(),
            "{ not a transcript"
        );
    }

    #[test]
    fn key_replaces_unreadable_config() {
        let (_dir, home) = home_with("DATABASE = open('x')\n");
        let startup = prepare(&args(&["--key", "k2", "-t", "1.5"]), &home).unwrap();
        assert!(matches!(startup, Startup::ConfigCreated(ref r) if r.temperature == 1.5));
    }

    #[test]
    fn corrupt_transcript_stops_start_up() {
        let (_dir, home) = home_with(SETTINGS);
        fs::write(home.latest_path(), "[1, 2]").unwrap();
        let err = prepare(&args(&[]), &home).unwrap_err();
        assert!(err.is_transcript_corrupt(), "{err}");
        assert_eq!(fs::read_to_string(home.latest_path()).unwrap(), "[1, 2]");
    }

    #[test]
    fn overrides_apply_without_persisting() {
        let (_dir, home) = home_with(SETTINGS);
        let prepared = ready(prepare(&args(&["-r", "-d"]), &home).unwrap());
        assert_eq!(prepared.config.model, "deepseek-reasoner");
        assert!(!prepared.config.stream);

        let durable = ConfigStore::new(home.config_path()).load().unwrap();
        assert_eq!(durable.model, "deepseek-chat");
        assert!(durable.stream);
    }

    #[test]
    fn persist_writes_overrides() {
        let (_dir, home) = home_with(SETTINGS);
        ready(prepare(&args(&["-r", "-b", "-p"]), &home).unwrap());

        let durable = ConfigStore::new(home.config_path()).load().unwrap();
        assert_eq!(durable.model, "deepseek-reasoner");
        assert_eq!(durable.base_url, "https://beta.api.deepseek.com/beta");
        assert_eq!(durable.temperature, 0.3);
    }

    #[test]
    fn loads_previous_transcript() {
        let (_dir, home) = home_with(SETTINGS);
        fs::write(
            home.latest_path(),
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();
        let prepared = ready(prepare(&args(&[]), &home).unwrap());
        assert_eq!(
            prepared.transcript.messages(),
            vec![Message::user("hi"), Message::assistant("hello")]
        );
    }

    #[test]
    fn new_archives_before_status() {
        let (_dir, home) = home_with(SETTINGS);
        let args = args(&["-n", "-s"]);
        let prepared = ready(prepare(&args, &home).unwrap());
        prepared.transcript.append(Message::user("old topic"));

        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let next = prepared.run_actions(&args, &mut renderer).unwrap();
        assert_eq!(next, NextStep::Exit);
        assert!(prepared.transcript.is_empty());

        let out = String::from_utf8(renderer.into_inner()).unwrap();
        let archived = out.find("Conversation archived to ").expect(&out);
        let status = out.find("api_key: x").expect(&out);
        assert!(archived < status, "{out}");
        assert!(out.ends_with(&format!("transcript: {}\n", home.latest_path().display())));
    }

    #[test]
    fn no_actions_means_chat() {
        let (_dir, home) = home_with(SETTINGS);
        let args = args(&[]);
        let prepared = ready(prepare(&args, &home).unwrap());
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        assert_eq!(prepared.run_actions(&args, &mut renderer).unwrap(), NextStep::Chat);
        assert!(renderer.into_inner().is_empty());
    }
}
