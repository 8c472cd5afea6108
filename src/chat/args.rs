//! Command-line arguments for the dschat tool.
//!
//! Flags either act once (`--key`, `--new`, `--status`) or override the
//! configuration for this run (`--beta`, `--reasoner`, `--memory`,
//! `--no_stream`). `--persist` writes the overrides back to the file.

use std::ffi::OsStr;

use getopts::Options;

use crate::config::{BETA_BASE_URL, ConfigRecord, DEFAULT_TEMPERATURE, REASONER_MODEL};
use crate::error::{Error, Result};
use crate::literal::Literal;

/// Parsed command-line arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatArgs {
    /// Archive the current transcript and start a new one.
    pub new: bool,
    /// Write a fresh configuration with this API key and exit.
    pub key: Option<String>,
    /// Use the beta endpoint for this run.
    pub beta: bool,
    /// Use the reasoning model for this run.
    pub reasoner: bool,
    /// Force memory on for this run.
    pub memory: bool,
    /// Print the resolved configuration and exit.
    pub status: bool,
    /// Temperature written by `--key`.
    pub temperature: f64,
    /// Disable streaming for this run.
    pub no_stream: bool,
    /// Write this run's overrides to the configuration file.
    pub persist: bool,
    /// Print usage and exit.
    pub help: bool,
}

impl Default for ChatArgs {
    fn default() -> Self {
        Self {
            new: false,
            key: None,
            beta: false,
            reasoner: false,
            memory: false,
            status: false,
            temperature: DEFAULT_TEMPERATURE,
            no_stream: false,
            persist: false,
            help: false,
        }
    }
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("n", "new", "archive the current conversation and start a new one");
    opts.optopt(
        "k",
        "key",
        "write a new configuration with this API key and exit",
        "KEY",
    );
    opts.optflag("b", "beta", "use the beta endpoint for this run");
    opts.optflag("r", "reasoner", "use the reasoning model for this run");
    opts.optflag("m", "memory", "keep the conversation across runs");
    opts.optflag("s", "status", "print the configuration and exit");
    opts.optopt(
        "t",
        "temperature",
        "temperature for a configuration created by --key (default: 0.7)",
        "FLOAT",
    );
    opts.optflag("d", "no_stream", "wait for whole responses instead of streaming");
    opts.optflag("p", "persist", "save the -b/-r/-m/-d overrides to the configuration");
    opts.optflag("h", "help", "print this help and exit");
    opts
}

impl ChatArgs {
    /// Parses arguments, excluding the program name.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] for unknown flags, missing values, positional
    /// arguments or a temperature that is not a finite number.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let matches = options()
            .parse(args)
            .map_err(|e| Error::usage(e.to_string()))?;
        if let Some(extra) = matches.free.first() {
            return Err(Error::usage(format!("unexpected argument: {extra}")));
        }
        let temperature = match matches.opt_str("t") {
            Some(value) => match value.parse::<f64>() {
                Ok(t) if t.is_finite() => t,
                _ => {
                    return Err(Error::usage(format!(
                        "--temperature expects a number, got {value:?}"
                    )));
                }
            },
            None => DEFAULT_TEMPERATURE,
        };
        Ok(Self {
            new: matches.opt_present("n"),
            key: matches.opt_str("k"),
            beta: matches.opt_present("b"),
            reasoner: matches.opt_present("r"),
            memory: matches.opt_present("m"),
            status: matches.opt_present("s"),
            temperature,
            no_stream: matches.opt_present("d"),
            persist: matches.opt_present("p"),
            help: matches.opt_present("h"),
        })
    }

    /// Usage text for `program`.
    pub fn usage(program: &str) -> String {
        options().usage(&format!("Usage: {program} [options]"))
    }

    /// Applies the per-run overrides to a loaded record.
    pub fn apply(&self, record: &mut ConfigRecord) {
        for (key, value) in self.overrides() {
            match (key.as_str(), value) {
                ("base_url", Literal::Str(url)) => record.base_url = url,
                ("model", Literal::Str(model)) => record.model = model,
                ("memory", Literal::Bool(memory)) => record.memory = memory,
                ("stream", Literal::Bool(stream)) => record.stream = stream,
                _ => {}
            }
        }
    }

    /// The per-run overrides as configuration entries, for `--persist`.
    pub fn overrides(&self) -> Vec<(String, Literal)> {
        let mut overrides = Vec::new();
        if self.beta {
            overrides.push(("base_url".to_string(), Literal::from(BETA_BASE_URL)));
        }
        if self.reasoner {
            overrides.push(("model".to_string(), Literal::from(REASONER_MODEL)));
        }
        if self.memory {
            overrides.push(("memory".to_string(), Literal::Bool(true)));
        }
        if self.no_stream {
            overrides.push(("stream".to_string(), Literal::Bool(false)));
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConfigRecord {
        ConfigRecord {
            api_key: "sk".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            memory: false,
            stream: true,
            extra: Vec::new(),
        }
    }

    #[test]
    fn no_arguments_gives_defaults() {
        let args = ChatArgs::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args, ChatArgs::default());
        assert!(args.overrides().is_empty());
    }

    #[test]
    fn short_and_long_flags() {
        let args = ChatArgs::parse(["-b", "--reasoner", "-m", "-d", "-t", "1.2", "-p"]).unwrap();
        assert!(args.beta && args.reasoner && args.memory && args.no_stream && args.persist);
        assert_eq!(args.temperature, 1.2);

        let args = ChatArgs::parse(["--key", "sk-new", "--no_stream"]).unwrap();
        assert_eq!(args.key.as_deref(), Some("sk-new"));
        assert!(args.no_stream);
    }

    #[test]
    fn usage_errors() {
        for bad in [
            vec!["--bogus"],
            vec!["-t", "warm"],
            vec!["-t", "inf"],
            vec!["-k"],
            vec!["hello"],
        ] {
            let err = ChatArgs::parse(&bad).unwrap_err();
            assert!(err.is_usage(), "{bad:?}: {err}");
        }
    }

    #[test]
    fn apply_overrides_for_this_run() {
        let args = ChatArgs::parse(["-b", "-r", "-m", "-d"]).unwrap();
        let mut record = record();
        args.apply(&mut record);
        assert_eq!(record.base_url, BETA_BASE_URL);
        assert_eq!(record.model, REASONER_MODEL);
        assert!(record.memory);
        assert!(!record.stream);
    }

    #[test]
    fn memory_flag_only_turns_memory_on() {
        let mut record = record();
        record.memory = true;
        ChatArgs::default().apply(&mut record);
        assert!(record.memory);
    }

    #[test]
    fn usage_lists_flags() {
        let usage = ChatArgs::usage("dschat");
        assert!(usage.starts_with("Usage: dschat [options]"));
        for flag in ["--new", "--key", "--beta", "--reasoner", "--no_stream", "--persist"] {
            assert!(usage.contains(flag), "{flag} missing from usage");
        }
    }
}
