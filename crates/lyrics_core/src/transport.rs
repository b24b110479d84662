//! Named-event message transport.
//!
//! The core talks to the editor surface and to platform dialogs only through
//! [`MessageTransport`]: fire a named event with a JSON payload, and listen
//! for named events. [`EventBus`] is an in-process implementation.
//!
//! Request/response exchanges go through [`request`], which returns a
//! [`Request`] future. The request registers a one-shot listener for the
//! response event before sending, matches the response by a `requestId`
//! correlation id, and removes its listener as soon as the response is
//! taken or the future is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll, Waker};

use serde_json::{Map, Value};

/// Event names exchanged with the editor surface.
pub mod events {
    /// Ask the editor for its current text. Payload: `{requestId}`.
    pub const REQUEST_EDITOR_TEXT: &str = "request-editor-text";
    /// Editor's answer. Payload: `{requestId, text}`.
    pub const EDITOR_TEXT: &str = "editor-text";
    /// Ask the user a yes/no question. Payload: `{requestId, title, message}`.
    pub const SHOW_YES_NO_DIALOG: &str = "show-yes-no-dialog";
    /// The user's answer. Payload: `{requestId, answer}`; a missing or null
    /// answer means the dialog was dismissed.
    pub const YES_NO_DIALOG_RESPONSE: &str = "yes-no-dialog-response";
    /// Replace the open document's text. Payload: `{text}`.
    pub const FILE_OPENED: &str = "file-opened";
}

/// Key carrying the correlation id in request and response payloads.
pub const REQUEST_ID: &str = "requestId";

/// A unique identifier for a listener registration.
pub type ListenerId = u64;

/// Callback invoked with an event's payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Deliver named events to and from the surrounding application.
pub trait MessageTransport: Send + Sync {
    /// Send `event` with `payload`.
    fn send(&self, event: &str, payload: Value);

    /// Listen for `event`. Returns an id for [`MessageTransport::remove_listener`].
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Stop listening. Returns `true` if the listener was registered.
    fn remove_listener(&self, event: &str, id: ListenerId) -> bool;
}

/// In-process transport: `send` delivers to the listeners registered with `on`.
///
/// Handlers run synchronously and may register or remove listeners,
/// including themselves, while being invoked.
pub struct EventBus {
    listeners: RwLock<HashMap<String, HashMap<ListenerId, EventHandler>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let listeners = self.listeners.read().unwrap();
        listeners.get(event).map_or(0, HashMap::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for EventBus {
    fn send(&self, event: &str, payload: Value) {
        // Snapshot so handlers can touch the registry without deadlocking.
        let handlers: Vec<EventHandler> = {
            let listeners = self.listeners.read().unwrap();
            listeners
                .get(event)
                .map(|by_id| by_id.values().cloned().collect())
                .unwrap_or_default()
        };

        log::debug!("Event '{}' -> {} listener(s)", event, handlers.len());
        for handler in handlers {
            // Use catch_unwind to prevent one handler from breaking others
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(&payload);
            }));
            if result.is_err() {
                log::warn!("Listener for '{}' panicked", event);
            }
        }
    }

    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self.listeners.write().unwrap();
        listeners
            .entry(event.to_string())
            .or_default()
            .insert(id, handler);
        id
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap();
        let Some(by_id) = listeners.get_mut(event) else {
            return false;
        };
        let removed = by_id.remove(&id).is_some();
        if by_id.is_empty() {
            listeners.remove(event);
        }
        removed
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap();
        f.debug_struct("EventBus")
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    response: Option<Value>,
    waker: Option<Waker>,
}

/// A pending request/response exchange. Resolves to the response payload.
pub struct Request {
    transport: Arc<dyn MessageTransport>,
    response_event: String,
    listener: Option<ListenerId>,
    slot: Arc<Mutex<Slot>>,
}

/// Send `request_event` with `payload` and wait for the matching `response_event`.
///
/// `payload` must be a JSON object (or null); a fresh `requestId` is added to
/// it. Responses carrying a different `requestId` are ignored.
pub fn request(
    transport: Arc<dyn MessageTransport>,
    request_event: &str,
    response_event: &str,
    payload: Value,
) -> Request {
    let request_id = uuid::Uuid::new_v4().to_string();
    let slot = Arc::new(Mutex::new(Slot::default()));

    let handler_slot = Arc::clone(&slot);
    let expected_id = request_id.clone();
    let handler: EventHandler = Arc::new(move |response: &Value| {
        if response.get(REQUEST_ID).and_then(Value::as_str) != Some(expected_id.as_str()) {
            return;
        }
        let mut slot = handler_slot.lock().unwrap();
        if slot.response.is_some() {
            return;
        }
        slot.response = Some(response.clone());
        if let Some(waker) = slot.waker.take() {
            waker.wake();
        }
    });
    let listener = transport.on(response_event, handler);

    let mut body = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert(REQUEST_ID.to_string(), Value::String(request_id));
    transport.send(request_event, Value::Object(body));

    Request {
        transport,
        response_event: response_event.to_string(),
        listener: Some(listener),
        slot,
    }
}

impl Request {
    fn deregister(&mut self) {
        if let Some(id) = self.listener.take() {
            self.transport.remove_listener(&self.response_event, id);
        }
    }
}

impl Future for Request {
    type Output = Value;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Value> {
        let this = self.get_mut();
        let response = {
            let mut slot = this.slot.lock().unwrap();
            match slot.response.take() {
                Some(response) => response,
                None => {
                    slot.waker = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        };
        this.deregister();
        Poll::Ready(response)
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_send_reaches_only_matching_event() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        bus.on("a", Arc::new(move |_: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        bus.send("a", Value::Null);
        bus.send("b", Value::Null);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::new();
        let id = bus.on("a", Arc::new(|_: &Value| {}));
        assert_eq!(bus.listener_count("a"), 1);
        assert!(bus.remove_listener("a", id));
        assert!(!bus.remove_listener("a", id));
        assert_eq!(bus.listener_count("a"), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on("a", Arc::new(|_: &Value| panic!("listener failure")));
        let c = Arc::clone(&counter);
        bus.on("a", Arc::new(move |_: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        bus.send("a", Value::Null);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Answer every `ping` with a `pong` echoing the request id.
    fn install_echo(bus: &Arc<EventBus>) {
        let weak = Arc::downgrade(bus);
        bus.on("ping", Arc::new(move |payload: &Value| {
            if let Some(bus) = weak.upgrade() {
                bus.send(
                    "pong",
                    json!({ "requestId": payload[REQUEST_ID].clone(), "value": payload["value"] }),
                );
            }
        }));
    }

    #[test]
    fn test_request_resolves_and_deregisters() {
        let bus = Arc::new(EventBus::new());
        install_echo(&bus);

        let transport: Arc<dyn MessageTransport> = bus.clone();
        let response =
            futures_lite::future::block_on(request(transport, "ping", "pong", json!({ "value": 7 })));

        assert_eq!(response["value"], 7);
        assert_eq!(bus.listener_count("pong"), 0);
    }

    #[test]
    fn test_request_ignores_foreign_responses() {
        let bus = Arc::new(EventBus::new());
        let transport: Arc<dyn MessageTransport> = bus.clone();

        let mut pending = request(transport, "ping", "pong", json!({}));
        bus.send("pong", json!({ "requestId": "someone-else", "value": 1 }));

        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        assert!(Pin::new(&mut pending).poll(&mut cx).is_pending());
        assert_eq!(bus.listener_count("pong"), 1);
    }

    #[test]
    fn test_dropped_request_deregisters() {
        let bus = Arc::new(EventBus::new());
        let transport: Arc<dyn MessageTransport> = bus.clone();

        let pending = request(transport, "ping", "pong", json!({}));
        assert_eq!(bus.listener_count("pong"), 1);
        drop(pending);
        assert_eq!(bus.listener_count("pong"), 0);
    }
}
