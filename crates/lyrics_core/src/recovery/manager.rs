use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::{RecoveryOutcome, RecoveryPhase, RecoveryState};
use crate::app_data::AppData;
use crate::clock::Clock;
use crate::config::Config;
use crate::extension;
use crate::history::HistoryLedger;
use crate::transport::{self, MessageTransport, events};

const RESTORE_TITLE: &str = "Restore unsaved lyrics?";
const RESTORE_MESSAGE: &str =
    "Lyrics from your last session were never saved. Do you want to restore them?";

/// Start-up recovery check plus the idle and periodic autosave loop.
///
/// The host calls [`RecoveryManager::on_initial_file_load`] once when the
/// first document is about to load, then forwards idle notifications to
/// [`RecoveryManager::on_idle`], drives [`RecoveryManager::tick`] from a
/// timer, and reports document switches through
/// [`RecoveryManager::on_document_changed`].
///
/// After a restore, the host passes [`RecoveryManager::ledger`] to
/// [`DocumentSession::restore_history`](crate::session::DocumentSession::restore_history)
/// so the recovered history is written into the next saved container.
pub struct RecoveryManager {
    transport: Arc<dyn MessageTransport>,
    app_data: Arc<dyn AppData>,
    clock: Arc<dyn Clock>,
    config: Config,
    phase: RecoveryPhase,
    state: RecoveryState,
    ledger: HistoryLedger,
    next_periodic_save: Option<DateTime<Utc>>,
}

impl RecoveryManager {
    /// Create a manager in the [`RecoveryPhase::Idle`] phase.
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        app_data: Arc<dyn AppData>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let ledger = HistoryLedger::with_clock(Arc::clone(&clock));
        Self {
            transport,
            app_data,
            clock,
            config,
            phase: RecoveryPhase::Idle,
            state: RecoveryState::default(),
            ledger,
            next_periodic_save: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Prompt and autosave bookkeeping.
    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    /// History accumulated by autosaves (including any restored record).
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// When [`RecoveryManager::tick`] will next save, once autosaving.
    pub fn next_periodic_save(&self) -> Option<DateTime<Utc>> {
        self.next_periodic_save
    }

    /// Look for an unsynced record and offer to restore it.
    ///
    /// Only the first call does anything; later calls return
    /// [`RecoveryOutcome::AlreadyChecked`].
    pub async fn on_initial_file_load(&mut self) -> RecoveryOutcome {
        if self.phase != RecoveryPhase::Idle {
            return RecoveryOutcome::AlreadyChecked;
        }

        self.phase = RecoveryPhase::Checking;
        let outcome = self.check_unsynced_record().await;
        log::info!("Recovery check finished: {:?}", outcome);

        self.phase = RecoveryPhase::Autosaving;
        self.next_periodic_save = self.periodic_deadline(self.clock.now());
        outcome
    }

    /// When the periodic save after `now` is due. `None` only if even the
    /// default period runs past the last representable date.
    fn periodic_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.config.periodic_save_interval())
            .or_else(|| {
                log::warn!("Periodic autosave deadline out of range; using the default period");
                now.checked_add_signed(Config::default().periodic_save_interval())
            })
    }

    async fn check_unsynced_record(&mut self) -> RecoveryOutcome {
        let key = self.config.unsaved_key.clone();
        if !self.app_data.exists(&key) {
            return RecoveryOutcome::NoRecord;
        }

        let raw = match self.app_data.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return RecoveryOutcome::NoRecord,
            Err(e) => {
                log::warn!("Could not read unsynced record: {}", e);
                return RecoveryOutcome::NoRecord;
            }
        };

        // Parsed once; the same ledger answers the emptiness check and the restore.
        let capsule = extension::decode_capsule(raw.as_bytes());
        let mut restored = self.ledger.fresh();
        restored.deserialize(&capsule);
        if !restored.has_changes() {
            log::debug!("Unsynced record holds no edits; not prompting");
            return RecoveryOutcome::EmptyRecord;
        }

        self.phase = RecoveryPhase::Prompting;
        let response = transport::request(
            Arc::clone(&self.transport),
            events::SHOW_YES_NO_DIALOG,
            events::YES_NO_DIALOG_RESPONSE,
            json!({ "title": RESTORE_TITLE, "message": RESTORE_MESSAGE }),
        )
        .await;
        self.state.has_prompted_recovery = true;

        // A dismissed dialog answers null.
        let restore = response.get("answer").and_then(Value::as_bool).unwrap_or(false);
        if restore {
            let text = restored.full_text();
            self.ledger = restored;
            self.transport.send(events::FILE_OPENED, json!({ "text": text }));
            RecoveryOutcome::Restored
        } else {
            if let Err(e) = self.app_data.delete(&key) {
                log::warn!("Could not discard unsynced record: {}", e);
            }
            RecoveryOutcome::Discarded
        }
    }

    /// The editor went quiet. Saves unless the last save was too recent.
    ///
    /// Returns whether a save succeeded.
    pub async fn on_idle(&mut self) -> bool {
        if self.phase != RecoveryPhase::Autosaving {
            return false;
        }
        let now = self.clock.now();
        if !self
            .state
            .should_idle_save(now, self.config.idle_save_interval())
        {
            return false;
        }
        self.autosave().await
    }

    /// Timer callback. Saves unconditionally once the periodic deadline has
    /// passed, then re-arms it.
    ///
    /// Returns whether a save succeeded.
    pub async fn tick(&mut self) -> bool {
        if self.phase != RecoveryPhase::Autosaving {
            return false;
        }
        let now = self.clock.now();
        match self.next_periodic_save {
            Some(deadline) if now >= deadline => {}
            _ => return false,
        }
        self.next_periodic_save = self.periodic_deadline(now);
        self.autosave().await
    }

    /// Fetch the editor text, record it and persist the history.
    ///
    /// Failures are logged; the in-memory ledger stays authoritative.
    pub async fn autosave(&mut self) -> bool {
        let response = transport::request(
            Arc::clone(&self.transport),
            events::REQUEST_EDITOR_TEXT,
            events::EDITOR_TEXT,
            json!({}),
        )
        .await;
        let Some(text) = response.get("text").and_then(Value::as_str) else {
            log::warn!("Editor answered without text; skipping autosave");
            return false;
        };

        self.ledger.add(text);
        let encoded = match serde_json::to_string(&self.ledger.serialize()) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("Could not encode history for autosave: {}", e);
                return false;
            }
        };

        match self.app_data.set(&self.config.unsaved_key, &encoded) {
            Ok(()) => {
                self.state.last_autosave = Some(self.clock.now());
                log::debug!("Autosaved {} history entries", self.ledger.len());
                true
            }
            Err(e) => {
                log::warn!("Autosave failed: {}", e);
                false
            }
        }
    }

    /// The user opened another file or started a new one.
    ///
    /// Once the start-up check has finished, the unsynced record belongs to
    /// the previous document and is removed. Returns whether it was.
    pub fn on_document_changed(&mut self) -> bool {
        if self.phase != RecoveryPhase::Autosaving {
            log::debug!("Document changed during recovery check; keeping record");
            return false;
        }
        self.ledger = self.ledger.fresh();
        match self.app_data.delete(&self.config.unsaved_key) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not remove unsynced record: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("ledger", &self.ledger)
            .field("next_periodic_save", &self.next_periodic_save)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_data::MemoryAppData;
    use crate::clock::ManualClock;
    use crate::error::{LyricsError, Result};
    use crate::test_utils::EditorStub;
    use chrono::Duration;
    use futures_lite::future::block_on;

    struct Fixture {
        editor: EditorStub,
        app_data: MemoryAppData,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                editor: EditorStub::new(),
                app_data: MemoryAppData::new(),
                clock: ManualClock::default(),
            }
        }

        fn manager(&self) -> RecoveryManager {
            RecoveryManager::new(
                self.editor.transport(),
                Arc::new(self.app_data.clone()),
                Arc::new(self.clock.clone()),
                Config::default(),
            )
        }

        fn seed_record(&self, texts: &[&str]) {
            let mut ledger = HistoryLedger::with_clock(Arc::new(self.clock.clone()));
            for text in texts {
                ledger.add(text);
            }
            let encoded = serde_json::to_string(&ledger.serialize()).unwrap();
            self.app_data.set("unsaved-lyrics-key", &encoded).unwrap();
        }
    }

    #[test]
    fn test_no_record_goes_straight_to_autosaving() {
        let fx = Fixture::new();
        let mut manager = fx.manager();
        assert_eq!(manager.phase(), RecoveryPhase::Idle);

        assert_eq!(block_on(manager.on_initial_file_load()), RecoveryOutcome::NoRecord);
        assert_eq!(manager.phase(), RecoveryPhase::Autosaving);
        assert_eq!(fx.editor.prompt_count(), 0);
        assert_eq!(
            manager.next_periodic_save(),
            Some(fx.clock.now() + Duration::minutes(5))
        );
    }

    #[test]
    fn test_empty_record_does_not_prompt() {
        let fx = Fixture::new();
        fx.seed_record(&[]);
        let mut manager = fx.manager();

        assert_eq!(block_on(manager.on_initial_file_load()), RecoveryOutcome::EmptyRecord);
        assert_eq!(fx.editor.prompt_count(), 0);
        assert!(!manager.state().has_prompted_recovery);
    }

    #[test]
    fn test_restore_sends_file_opened() {
        let fx = Fixture::new();
        fx.seed_record(&["Row", "Row, row", "Row, row your boat"]);
        fx.editor.answer_prompts_with(Some(true));
        let mut manager = fx.manager();

        assert_eq!(block_on(manager.on_initial_file_load()), RecoveryOutcome::Restored);
        assert_eq!(fx.editor.prompt_count(), 1);
        assert_eq!(fx.editor.opened_texts(), vec!["Row, row your boat".to_string()]);
        assert_eq!(manager.ledger().len(), 3);
        assert!(manager.state().has_prompted_recovery);
        assert!(fx.app_data.exists("unsaved-lyrics-key"));
    }

    #[test]
    fn test_decline_and_dismiss_discard_record() {
        for answer in [Some(false), None] {
            let fx = Fixture::new();
            fx.seed_record(&["Verse"]);
            fx.editor.answer_prompts_with(answer);
            let mut manager = fx.manager();

            assert_eq!(block_on(manager.on_initial_file_load()), RecoveryOutcome::Discarded);
            assert!(!fx.app_data.exists("unsaved-lyrics-key"));
            assert!(fx.editor.opened_texts().is_empty());
            assert!(manager.ledger().is_empty());
            assert!(manager.state().has_prompted_recovery);
        }
    }

    #[test]
    fn test_second_check_is_noop() {
        let fx = Fixture::new();
        fx.seed_record(&["Verse"]);
        fx.editor.answer_prompts_with(Some(true));
        let mut manager = fx.manager();

        block_on(manager.on_initial_file_load());
        assert_eq!(
            block_on(manager.on_initial_file_load()),
            RecoveryOutcome::AlreadyChecked
        );
        assert_eq!(fx.editor.prompt_count(), 1);
    }

    #[test]
    fn test_autosave_waits_for_check() {
        let fx = Fixture::new();
        fx.editor.set_text("early");
        let mut manager = fx.manager();

        assert!(!block_on(manager.on_idle()));
        assert!(!block_on(manager.tick()));
        assert!(!manager.on_document_changed());
        assert_eq!(fx.editor.text_request_count(), 0);
        assert!(fx.app_data.is_empty());
    }

    #[test]
    fn test_idle_guard() {
        let fx = Fixture::new();
        let mut manager = fx.manager();
        block_on(manager.on_initial_file_load());

        fx.editor.set_text("first line");
        assert!(block_on(manager.on_idle()));

        fx.clock.advance(Duration::seconds(10));
        fx.editor.set_text("first line, more");
        assert!(!block_on(manager.on_idle()));
        assert_eq!(fx.editor.text_request_count(), 1);

        fx.clock.advance(Duration::seconds(20));
        assert!(block_on(manager.on_idle()));
        assert_eq!(manager.ledger().len(), 2);
        assert_eq!(manager.state().last_autosave, Some(fx.clock.now()));

        let stored = fx.app_data.get("unsaved-lyrics-key").unwrap().unwrap();
        let capsule = extension::decode_capsule(stored.as_bytes());
        let mut ledger = HistoryLedger::restored(&capsule);
        assert_eq!(ledger.full_text(), "first line, more");
    }

    #[test]
    fn test_idle_always_saves_after_prompt() {
        let fx = Fixture::new();
        fx.seed_record(&["Verse"]);
        fx.editor.answer_prompts_with(Some(false));
        let mut manager = fx.manager();
        block_on(manager.on_initial_file_load());

        fx.editor.set_text("a");
        assert!(block_on(manager.on_idle()));
        fx.clock.advance(Duration::seconds(1));
        fx.editor.set_text("ab");
        assert!(block_on(manager.on_idle()));
    }

    #[test]
    fn test_periodic_tick() {
        let fx = Fixture::new();
        let mut manager = fx.manager();
        block_on(manager.on_initial_file_load());
        fx.editor.set_text("chorus");

        fx.clock.advance(Duration::minutes(4));
        assert!(!block_on(manager.tick()));

        fx.clock.advance(Duration::minutes(1));
        assert!(block_on(manager.tick()));
        assert_eq!(
            manager.next_periodic_save(),
            Some(fx.clock.now() + Duration::minutes(5))
        );

        // Re-armed: the next tick right away does nothing.
        assert!(!block_on(manager.tick()));
        assert_eq!(fx.editor.text_request_count(), 1);
    }

    #[test]
    fn test_unreachable_period_falls_back_to_default() {
        let fx = Fixture::new();
        let config = Config {
            periodic_save_interval_secs: 9_000_000_000_000_000,
            ..Config::default()
        };
        let mut manager = RecoveryManager::new(
            fx.editor.transport(),
            Arc::new(fx.app_data.clone()),
            Arc::new(fx.clock.clone()),
            config,
        );
        block_on(manager.on_initial_file_load());
        assert_eq!(
            manager.next_periodic_save(),
            Some(fx.clock.now() + Duration::minutes(5))
        );

        fx.editor.set_text("still saving");
        fx.clock.advance(Duration::minutes(5));
        assert!(block_on(manager.tick()));
        assert_eq!(
            manager.next_periodic_save(),
            Some(fx.clock.now() + Duration::minutes(5))
        );
    }

    #[test]
    fn test_document_change_clears_record() {
        let fx = Fixture::new();
        let mut manager = fx.manager();
        block_on(manager.on_initial_file_load());
        fx.editor.set_text("old song");
        block_on(manager.autosave());
        assert!(fx.app_data.exists("unsaved-lyrics-key"));

        assert!(manager.on_document_changed());
        assert!(!fx.app_data.exists("unsaved-lyrics-key"));
        assert!(manager.ledger().is_empty());
    }

    #[test]
    fn test_autosave_without_text_is_skipped() {
        let fx = Fixture::new();
        fx.editor.answer_text_requests(false);
        let mut manager = fx.manager();
        block_on(manager.on_initial_file_load());

        assert!(!block_on(manager.autosave()));
        assert!(fx.app_data.is_empty());
    }

    struct FailingAppData;

    impl AppData for FailingAppData {
        fn set(&self, key: &str, _value: &str) -> Result<()> {
            Err(LyricsError::AppData {
                key: key.to_string(),
                message: "disk full".to_string(),
            })
        }

        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn exists(&self, _key: &str) -> bool {
            false
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_autosave_keeps_ledger() {
        let fx = Fixture::new();
        let mut manager = RecoveryManager::new(
            fx.editor.transport(),
            Arc::new(FailingAppData),
            Arc::new(fx.clock.clone()),
            Config::default(),
        );
        block_on(manager.on_initial_file_load());
        fx.editor.set_text("unsaved verse");

        assert!(!block_on(manager.on_idle()));
        assert_eq!(manager.ledger().len(), 1);
        assert_eq!(manager.state().last_autosave, None);
    }
}
