//! Process exit handling.
//!
//! However the process ends (quit, end of input, Ctrl-C, SIGTERM, SIGHUP, an
//! error returned to `main` or a panic), the transcript is saved exactly once.
//! Every path funnels into [`Shutdown::run`]; the save-once flag inside
//! [`TranscriptStore`] turns overlapping triggers into no-ops.

use std::error::Error as _;
use std::io::{self, Write};
use std::panic;
use std::process;

use crate::error::{Error, Result};
use crate::transcript::{SaveOutcome, TranscriptStore};

/// Why the process is exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    /// The user quit or input ended.
    Normal,
    /// SIGINT, SIGTERM, SIGHUP or Ctrl-C at the prompt.
    Interrupt,
    /// An error reached the top level.
    Error,
}

impl ExitTrigger {
    /// The status the process exits with when the save succeeds.
    pub fn exit_code(self) -> i32 {
        match self {
            ExitTrigger::Normal | ExitTrigger::Interrupt => 0,
            ExitTrigger::Error => 1,
        }
    }
}

/// The shared exit routine.
#[derive(Clone)]
pub struct Shutdown {
    transcript: TranscriptStore,
}

impl Shutdown {
    /// Creates the routine for `transcript`.
    pub fn new(transcript: TranscriptStore) -> Self {
        Self { transcript }
    }

    /// Saves the transcript and returns the exit status, reporting on stdout/stderr.
    pub fn run(&self, trigger: ExitTrigger) -> i32 {
        self.run_with(trigger, &mut io::stdout(), &mut io::stderr())
    }

    /// [`run`](Self::run) with explicit output streams.
    ///
    /// A failed save turns any trigger into exit status 1.
    pub fn run_with(&self, trigger: ExitTrigger, out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        report(self.transcript.save_latest(), trigger, out, err)
    }

    /// The panic hook's exit routine.
    ///
    /// Saves without blocking on the transcript lock, since the panicking
    /// thread may hold it, then runs `previous` so the panic message still
    /// appears. Returns the exit status.
    fn run_after_panic(
        &self,
        previous: &dyn Fn(),
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        let code = report(self.transcript.try_save_latest(), ExitTrigger::Error, out, err);
        previous();
        code
    }
}

fn report(
    saved: Result<SaveOutcome>,
    trigger: ExitTrigger,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> i32 {
    match saved {
        Ok(SaveOutcome::Saved(path)) => {
            let _ = writeln!(out, "Transcript saved to {}", path.display());
            let _ = out.flush();
            trigger.exit_code()
        }
        Ok(SaveOutcome::Busy) => {
            let _ = writeln!(err, "Transcript is in use; not saved");
            trigger.exit_code()
        }
        Ok(SaveOutcome::Disabled | SaveOutcome::AlreadySaved) => trigger.exit_code(),
        Err(e) => {
            let _ = writeln!(err, "Failed to save transcript: {e}");
            1
        }
    }
}

/// Writes `error` and its chain of causes.
pub fn print_error_chain(error: &Error, err: &mut dyn Write) {
    let _ = writeln!(err, "Error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(err, "  caused by: {cause}");
        source = cause.source();
    }
}

/// Owns the exit paths of the interactive process.
///
/// Install it once the transcript is loaded. Dropping the guard counts as a
/// normal exit.
pub struct LifecycleGuard {
    shutdown: Shutdown,
}

impl LifecycleGuard {
    /// Installs the signal handler and the panic hook.
    ///
    /// The signal handler saves and exits with status 0. The panic hook saves,
    /// runs the previously installed hook so the panic message still appears,
    /// and exits with status 1.
    ///
    /// # Errors
    ///
    /// [`Error::Signal`] if a signal handler is already installed.
    pub fn install(transcript: TranscriptStore) -> Result<Self> {
        let shutdown = Shutdown::new(transcript);

        let on_signal = shutdown.clone();
        ctrlc::set_handler(move || {
            let code = on_signal.run(ExitTrigger::Interrupt);
            process::exit(code);
        })
        .map_err(|e| Error::signal(e.to_string()))?;

        let on_panic = shutdown.clone();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let code =
                on_panic.run_after_panic(&|| previous(info), &mut io::stdout(), &mut io::stderr());
            process::exit(code);
        }));

        Ok(Self::new(shutdown))
    }

    fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    /// The exit routine shared by every path.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Saves and exits with status 0.
    pub fn exit(self) -> ! {
        let code = self.shutdown.run(ExitTrigger::Normal);
        process::exit(code)
    }

    /// Saves and exits as if interrupted by a signal.
    pub fn interrupt(self) -> ! {
        let code = self.shutdown.run(ExitTrigger::Interrupt);
        process::exit(code)
    }

    /// Reports `error`, saves and exits with status 1.
    pub fn fail(self, error: &Error) -> ! {
        print_error_chain(error, &mut io::stderr());
        let code = self.shutdown.run(ExitTrigger::Error);
        process::exit(code)
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.shutdown.run(ExitTrigger::Normal);
    }
}
