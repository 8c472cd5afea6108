//! Conversation transcript and its persistence.
//!
//! [`TranscriptStore`] is a cloneable handle to the process's one transcript.
//! The chat session appends to it, the lifecycle guard saves it at exit, and the
//! signal handler thread reaches it through the same handle.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use time::Date;

use crate::error::{Error, Result};
use crate::observability::{ARCHIVES, SAVE_SKIPS, SAVES};
use crate::types::Message;
use crate::utils::fs::write_atomically;
use crate::utils::time::{iso_date, today};

/// Number of characters of the first message used in archive names.
const ARCHIVE_PREFIX_CHARS: usize = 32;

/// Archive name component used when the transcript is empty.
const EMPTY_PREFIX: &str = "None";

/// What a call to [`TranscriptStore::save_latest`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The transcript was written to the given path.
    Saved(PathBuf),
    /// Memory is disabled; nothing was written.
    Disabled,
    /// A save already happened (or was claimed) earlier in this process.
    AlreadySaved,
    /// The transcript was locked by the current thread; nothing was written.
    Busy,
}

struct Inner {
    messages: Mutex<Vec<Message>>,
    saved: AtomicBool,
    memory: bool,
    latest_path: PathBuf,
    archive_dir: PathBuf,
}

/// Shared handle to the transcript.
#[derive(Clone)]
pub struct TranscriptStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for TranscriptStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptStore")
            .field("latest_path", &self.inner.latest_path)
            .field("memory", &self.inner.memory)
            .field("saved", &self.has_saved())
            .finish_non_exhaustive()
    }
}

impl TranscriptStore {
    /// Creates an empty transcript.
    ///
    /// `memory` decides whether [`load_if_enabled`](Self::load_if_enabled) and
    /// [`save_latest`](Self::save_latest) touch `latest_path`.
    pub fn new(latest_path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>, memory: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                messages: Mutex::new(Vec::new()),
                saved: AtomicBool::new(false),
                memory,
                latest_path: latest_path.into(),
                archive_dir: archive_dir.into(),
            }),
        }
    }

    /// Path of the latest-transcript file.
    pub fn latest_path(&self) -> &Path {
        &self.inner.latest_path
    }

    /// Replaces the in-memory transcript with the latest file when memory is enabled.
    ///
    /// Returns the number of messages loaded. A missing file loads nothing.
    ///
    /// # Errors
    ///
    /// [`Error::TranscriptCorrupt`] if the file exists but is not a JSON array of
    /// messages. The file is left as it is.
    pub fn load_if_enabled(&self) -> Result<usize> {
        if !self.inner.memory {
            return Ok(0);
        }
        let path = &self.inner.latest_path;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(Error::io(format!("failed to read {}", path.display()), err)),
        };
        let loaded: Vec<Message> = serde_json::from_slice(&bytes)
            .map_err(|err| Error::transcript_corrupt(path, Some(Box::new(err))))?;
        let count = loaded.len();
        *self.lock() = loaded;
        Ok(count)
    }

    /// Appends one message.
    pub fn append(&self, message: Message) {
        self.lock().push(message);
    }

    /// A copy of the current transcript.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Number of messages in the transcript.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the transcript has no messages.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes the transcript to a dated archive file and clears it.
    ///
    /// Returns the archive path.
    pub fn archive_and_reset(&self) -> Result<PathBuf> {
        self.archive_and_reset_on(today())
    }

    /// [`archive_and_reset`](Self::archive_and_reset) with an explicit date.
    pub fn archive_and_reset_on(&self, date: Date) -> Result<PathBuf> {
        let mut messages = self.lock();
        let name = archive_file_name(date, messages.first());
        let path = self.inner.archive_dir.join(name);
        let json = to_pretty_json(&*messages)?;
        write_atomically(&path, &json)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
        messages.clear();
        ARCHIVES.click();
        Ok(path)
    }

    /// Saves the transcript to the latest file, at most once per process.
    ///
    /// The first call claims the save; every later call returns
    /// [`SaveOutcome::AlreadySaved`] without touching the disk. The claim holds
    /// even when memory is disabled or the write fails, so a failed save is
    /// never retried by a later exit path.
    pub fn save_latest(&self) -> Result<SaveOutcome> {
        if !self.claim_save() {
            return Ok(SaveOutcome::AlreadySaved);
        }
        if !self.inner.memory {
            SAVE_SKIPS.click();
            return Ok(SaveOutcome::Disabled);
        }
        let messages = self.lock();
        self.write_latest(&messages)
    }

    /// [`save_latest`](Self::save_latest) that never blocks on the transcript lock.
    ///
    /// Used from the panic hook: if the lock is held (possibly by the panicking
    /// thread itself) the save is skipped with [`SaveOutcome::Busy`] and the
    /// claim is released.
    pub fn try_save_latest(&self) -> Result<SaveOutcome> {
        let messages = match self.inner.messages.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(SaveOutcome::Busy),
        };
        if !self.claim_save() {
            return Ok(SaveOutcome::AlreadySaved);
        }
        if !self.inner.memory {
            SAVE_SKIPS.click();
            return Ok(SaveOutcome::Disabled);
        }
        self.write_latest(&messages)
    }

    /// Returns true once a save has been claimed.
    pub fn has_saved(&self) -> bool {
        self.inner.saved.load(Ordering::SeqCst)
    }

    fn claim_save(&self) -> bool {
        self.inner
            .saved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn write_latest(&self, messages: &[Message]) -> Result<SaveOutcome> {
        let path = &self.inner.latest_path;
        let json = to_pretty_json(messages)?;
        write_atomically(path, &json)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
        SAVES.click();
        Ok(SaveOutcome::Saved(path.clone()))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// `<date>_<first 32 characters of the first message>.json`
fn archive_file_name(date: Date, first: Option<&Message>) -> String {
    let prefix = match first {
        Some(message) => message
            .content
            .chars()
            .take(ARCHIVE_PREFIX_CHARS)
            .map(|c| {
                if c == '/' || c == '\\' || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect(),
        None => EMPTY_PREFIX.to_string(),
    };
    format!("{}_{prefix}.json", iso_date(date))
}

/// Pretty JSON with four-space indentation, as written to every transcript file.
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn store(dir: &Path, memory: bool) -> TranscriptStore {
        TranscriptStore::new(dir.join("latest.json"), dir, memory)
    }

    #[test]
    fn append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        transcript.append(Message::user("one"));
        transcript.append(Message::user("two"));
        transcript.append(Message::assistant("three"));
        let contents: Vec<String> = transcript
            .messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn save_latest_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        transcript.append(Message::user("hello"));

        let first = transcript.save_latest().unwrap();
        assert_eq!(first, SaveOutcome::Saved(dir.path().join("latest.json")));

        transcript.append(Message::assistant("later"));
        for _ in 0..3 {
            assert_eq!(transcript.save_latest().unwrap(), SaveOutcome::AlreadySaved);
        }

        let saved: Vec<Message> =
            serde_json::from_slice(&fs::read(dir.path().join("latest.json")).unwrap()).unwrap();
        assert_eq!(saved, vec![Message::user("hello")]);
        assert!(transcript.has_saved());
    }

    #[test]
    fn save_latest_with_memory_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), false);
        transcript.append(Message::user("hello"));
        assert_eq!(transcript.save_latest().unwrap(), SaveOutcome::Disabled);
        assert_eq!(transcript.save_latest().unwrap(), SaveOutcome::AlreadySaved);
        assert!(!dir.path().join("latest.json").exists());
    }

    #[test]
    fn saved_file_is_indented_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        transcript.append(Message::user("你好"));
        transcript.save_latest().unwrap();
        let text = fs::read_to_string(dir.path().join("latest.json")).unwrap();
        assert_eq!(
            text,
            "[\n    {\n        \"role\": \"user\",\n        \"content\": \"你好\"\n    }\n]"
        );
    }

    #[test]
    fn load_then_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let first = store(dir.path(), true);
        first.append(Message::user("question"));
        first.append(Message::assistant("answer"));
        first.save_latest().unwrap();
        let before = fs::read(dir.path().join("latest.json")).unwrap();

        let second = store(dir.path(), true);
        assert_eq!(second.load_if_enabled().unwrap(), 2);
        assert!(matches!(second.save_latest().unwrap(), SaveOutcome::Saved(_)));
        assert_eq!(fs::read(dir.path().join("latest.json")).unwrap(), before);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        assert_eq!(transcript.load_if_enabled().unwrap(), 0);
        assert!(transcript.is_empty());
    }

    #[test]
    fn load_is_skipped_without_memory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("latest.json"), "not json").unwrap();
        let transcript = store(dir.path(), false);
        assert_eq!(transcript.load_if_enabled().unwrap(), 0);
    }

    #[test]
    fn load_corrupt_file_fails_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.json");
        fs::write(&path, "[{\"role\": \"user\"").unwrap();
        let transcript = store(dir.path(), true);
        let err = transcript.load_if_enabled().unwrap_err();
        assert!(err.is_transcript_corrupt(), "{err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"role\": \"user\"");
    }

    #[test]
    fn archive_writes_transcript_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        let messages = vec![
            Message::user("What is the meaning of life, the universe and everything?"),
            Message::assistant("42"),
        ];
        for message in &messages {
            transcript.append(message.clone());
        }

        let path = transcript.archive_and_reset_on(date!(2025 - 01 - 31)).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2025-01-31_What is the meaning of life, the .json"
        );
        let archived: Vec<Message> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(archived, messages);
        assert!(transcript.is_empty());
        assert!(!transcript.has_saved());
    }

    #[test]
    fn archive_of_empty_transcript_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        let path = transcript.archive_and_reset_on(date!(2025 - 02 - 01)).unwrap();
        assert_eq!(path, dir.path().join("2025-02-01_None.json"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn archive_name_is_sanitized_and_counts_characters() {
        let message = Message::user("a/b\\c\nd 数据数据数据数据数据数据数据数据数据数据数据数据数据");
        let name = archive_file_name(date!(2024 - 12 - 24), Some(&message));
        let prefix = name
            .strip_prefix("2024-12-24_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .unwrap();
        assert_eq!(prefix.chars().count(), 32);
        assert!(prefix.starts_with("a_b_c_d "));
    }

    #[test]
    fn try_save_skips_when_locked() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        let guard = transcript.lock();
        assert_eq!(transcript.try_save_latest().unwrap(), SaveOutcome::Busy);
        drop(guard);
        assert!(!transcript.has_saved());
        assert!(matches!(transcript.try_save_latest().unwrap(), SaveOutcome::Saved(_)));
    }

    #[test]
    fn save_from_another_thread_sees_appended_messages() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = store(dir.path(), true);
        transcript.append(Message::user("dangling"));
        let handle = transcript.clone();
        let outcome = std::thread::spawn(move || handle.save_latest().unwrap())
            .join()
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        let saved: Vec<Message> =
            serde_json::from_slice(&fs::read(dir.path().join("latest.json")).unwrap()).unwrap();
        assert_eq!(saved, vec![Message::user("dangling")]);
    }
}
