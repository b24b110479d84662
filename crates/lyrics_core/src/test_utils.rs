//! Test utilities for lyrics_core
//!
//! This module provides shared testing infrastructure, including a stand-in
//! for the editor surface that answers requests over an [`EventBus`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::transport::{EventBus, MessageTransport, REQUEST_ID, events};

/// A fake editor and dialog host.
///
/// Answers `request-editor-text` with the current text, answers
/// `show-yes-no-dialog` with a configurable answer, and records every
/// `file-opened` payload. Clones share the same state.
#[derive(Clone)]
pub struct EditorStub {
    bus: Arc<EventBus>,
    text: Arc<Mutex<String>>,
    answer: Arc<Mutex<Option<bool>>>,
    answer_text: Arc<AtomicBool>,
    prompts: Arc<AtomicUsize>,
    text_requests: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl EditorStub {
    /// Create a stub listening on a fresh bus. Prompts are dismissed by default.
    pub fn new() -> Self {
        let stub = Self {
            bus: Arc::new(EventBus::new()),
            text: Arc::new(Mutex::new(String::new())),
            answer: Arc::new(Mutex::new(None)),
            answer_text: Arc::new(AtomicBool::new(true)),
            prompts: Arc::new(AtomicUsize::new(0)),
            text_requests: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(Mutex::new(Vec::new())),
        };
        stub.install();
        stub
    }

    fn install(&self) {
        let weak = Arc::downgrade(&self.bus);
        let text = Arc::clone(&self.text);
        let answer_text = Arc::clone(&self.answer_text);
        let text_requests = Arc::clone(&self.text_requests);
        self.bus.on(
            events::REQUEST_EDITOR_TEXT,
            Arc::new(move |payload: &Value| {
                text_requests.fetch_add(1, Ordering::SeqCst);
                let Some(bus) = weak.upgrade() else { return };
                let response = if answer_text.load(Ordering::SeqCst) {
                    let current = text.lock().unwrap().clone();
                    json!({ "requestId": payload[REQUEST_ID].clone(), "text": current })
                } else {
                    json!({ "requestId": payload[REQUEST_ID].clone() })
                };
                bus.send(events::EDITOR_TEXT, response);
            }),
        );

        let weak = Arc::downgrade(&self.bus);
        let answer = Arc::clone(&self.answer);
        let prompts = Arc::clone(&self.prompts);
        self.bus.on(
            events::SHOW_YES_NO_DIALOG,
            Arc::new(move |payload: &Value| {
                prompts.fetch_add(1, Ordering::SeqCst);
                let Some(bus) = weak.upgrade() else { return };
                let answer = *answer.lock().unwrap();
                bus.send(
                    events::YES_NO_DIALOG_RESPONSE,
                    json!({ "requestId": payload[REQUEST_ID].clone(), "answer": answer }),
                );
            }),
        );

        let opened = Arc::clone(&self.opened);
        self.bus.on(
            events::FILE_OPENED,
            Arc::new(move |payload: &Value| {
                if let Some(text) = payload["text"].as_str() {
                    opened.lock().unwrap().push(text.to_string());
                }
            }),
        );
    }

    /// The bus as a transport for the code under test.
    pub fn transport(&self) -> Arc<dyn MessageTransport> {
        self.bus.clone()
    }

    /// The underlying bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Set the text the editor reports.
    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    /// Answer future prompts with yes (`Some(true)`), no, or dismissal (`None`).
    pub fn answer_prompts_with(&self, answer: Option<bool>) {
        *self.answer.lock().unwrap() = answer;
    }

    /// Whether text responses carry a `text` field.
    pub fn answer_text_requests(&self, with_text: bool) {
        self.answer_text.store(with_text, Ordering::SeqCst);
    }

    /// Number of yes/no prompts shown.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Number of editor text requests received.
    pub fn text_request_count(&self) -> usize {
        self.text_requests.load(Ordering::SeqCst)
    }

    /// Texts pushed to the editor through `file-opened`, oldest first.
    pub fn opened_texts(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Default for EditorStub {
    fn default() -> Self {
        Self::new()
    }
}
