//! Protocol router.
//!
//! One handler per channel. Every request handler returns
//! `VigiaResult<Value>`; the router converts an `Err` into a
//! `{success:false, error}` response so no failure ever escapes across
//! the protocol boundary. Inbound frames are ignored wholesale while the
//! connection is paused, and a `payload.windowId` addressed to another
//! browsing context drops the message with no response at all.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::clock::ClockHandle;
use crate::connection::{Connection, TransportHandle};
use crate::console::{ConsoleBuffer, ConsoleLevel};
use crate::descriptor;
use crate::mutation::{MutationConfig, MutationEngine, MutationRecord};
use crate::page::{NodeId, PageHandle, RawEvent, RawEventKind, Rect};
use crate::protocol::{Channel, Message, Response};
use crate::recording::{RecordedStep, Recorder};
use crate::result::{VigiaError, VigiaResult};
use crate::selection::SelectionSession;
use crate::semantic::event::{EventCategory, SemanticEvent};
use crate::semantic::subscription::{Subscription, SubscriptionPreset};
use crate::semantic::SemanticEngine;
use crate::simulate::{Simulator, TypeOptions};

/// Default depth for `dom tree` responses.
const DEFAULT_TREE_DEPTH: u64 = 3;

/// The engine facade: connection, sub-engines, and channel dispatch.
pub struct Router {
    page: PageHandle,
    clock: ClockHandle,
    connection: Connection,
    semantic: SemanticEngine,
    mutations: MutationEngine,
    simulator: Simulator,
    console: ConsoleBuffer,
    recorder: Recorder,
    selection: SelectionSession,
    watched_events: BTreeSet<RawEventKind>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Assemble the full engine around a page adapter and transport.
    #[must_use]
    pub fn new(
        page: PageHandle,
        clock: ClockHandle,
        transport: TransportHandle,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            connection: Connection::new(page.clone(), clock.clone(), transport, endpoint),
            semantic: SemanticEngine::new(page.clone(), clock.clone()),
            mutations: MutationEngine::new(page.clone(), clock.clone()),
            simulator: Simulator::new(page.clone()),
            console: ConsoleBuffer::new(),
            recorder: Recorder::new(clock.clone()),
            selection: SelectionSession::new(page.clone(), clock.clone()),
            watched_events: BTreeSet::new(),
            page,
            clock,
        }
    }

    /// The connection, for lifecycle control by the host.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Mutable connection access for open/close callbacks.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Host-side resume. While paused the engine ignores every inbound
    /// frame, so un-pausing cannot arrive over the socket.
    pub fn activate(&mut self) -> VigiaResult<()> {
        self.connection.resume()
    }

    /// Host-side pause.
    pub fn deactivate(&mut self) -> VigiaResult<()> {
        self.connection.pause()
    }

    /// Handle one inbound frame end to end.
    ///
    /// Malformed JSON is dropped silently; so is everything while paused.
    pub fn handle_frame(&mut self, text: &str) -> Option<Response> {
        let message = Message::parse(text)?;
        if self.connection.is_paused() {
            trace!(channel = ?message.channel, "paused, frame ignored");
            return None;
        }
        self.dispatch(message)
    }

    /// Route a parsed message and send the response.
    pub fn dispatch(&mut self, message: Message) -> Option<Response> {
        if let Some(target) = message.payload.get("windowId").and_then(Value::as_str) {
            if target != self.connection.window_id() {
                trace!(target, "message addressed to another window");
                return None;
            }
        }
        let result = self.route(&message);
        let now = self.clock.now_ms();
        let response = match result {
            Ok(data) => Response::ok(message.id, data, now),
            Err(err) => {
                debug!(channel = ?message.channel, action = %message.action, %err, "request failed");
                Response::err(message.id, err.to_string(), now)
            }
        };
        self.connection.send_response(&response);
        Some(response)
    }

    /// Host callback: a raw capture-phase event arrived.
    pub fn handle_raw(&mut self, raw: &RawEvent) {
        if let RawEvent::FetchFailed {
            url,
            status,
            message,
        } = raw
        {
            self.console
                .record_network_error(url, *status, message, self.clock.now_ms());
        }
        self.semantic.handle_raw(raw);
        if self.watched_events.contains(&raw.kind()) {
            let target = raw
                .target()
                .map(|node| descriptor::resolve(self.page.as_ref(), node).description);
            let payload = json!({ "event": raw.kind(), "target": target });
            self.connection.push(Channel::Events, "event", payload);
        }
    }

    /// Host callback: intercepted console output.
    pub fn handle_console(&mut self, level: ConsoleLevel, args: &[Value]) {
        self.console.record(level, args, self.clock.now_ms());
    }

    /// Host callback: a structural observer fired.
    pub fn handle_mutation(&mut self, record: MutationRecord) {
        self.mutations.record(record);
    }

    /// Overlay callback: the user finished drawing a selection rectangle.
    pub fn handle_selection_complete(&mut self, rect: Rect) -> VigiaResult<()> {
        let result = self.selection.complete(rect)?;
        self.connection
            .push(Channel::Selection, "complete", serde_json::to_value(result)?);
        Ok(())
    }

    /// Drive all cooperative timers and forward anything that became due.
    ///
    /// A due mutation batch is mirrored into the semantic stream as a
    /// `mutation:batch` summary so counters and subscriptions see it.
    pub fn tick(&mut self) {
        self.connection.tick();
        self.semantic.tick();
        if let Some(batch) = self.mutations.tick() {
            let summary = SemanticEvent::new(
                "mutation:batch",
                EventCategory::Mutation,
                self.clock.now_ms(),
            )
            .with("added", json!(batch.added))
            .with("removed", json!(batch.removed))
            .with("attributes", json!(batch.attributes))
            .with("notable", json!(batch.notable.len()))
            .with("ignored", json!(batch.ignored));
            self.semantic.record(summary);
            if let Ok(payload) = serde_json::to_value(&batch) {
                self.connection.push(Channel::Mutations, "batch", payload);
            }
        }
        for event in self.semantic.drain_outbox() {
            if let Ok(payload) = serde_json::to_value(&event) {
                self.connection.push(Channel::Semantic, "event", payload);
            }
        }
    }

    fn route(&mut self, message: &Message) -> VigiaResult<Value> {
        let action = message.action.as_str();
        let payload = &message.payload;
        match message.channel {
            Channel::System => self.handle_system(action),
            Channel::Dom => self.handle_dom(action, payload),
            Channel::Events => self.handle_events(action, payload),
            Channel::Console => self.handle_console_channel(action, payload),
            Channel::Eval => self.handle_eval(action, payload),
            Channel::Recording => self.handle_recording(action),
            Channel::Selection => self.handle_selection(action),
            Channel::Navigation => self.handle_navigation(action, payload),
            Channel::Tabs => self.handle_tabs(action, payload),
            Channel::Mutations => self.handle_mutations(action, payload),
            Channel::Semantic => self.handle_semantic(action, payload),
            Channel::Interaction => self.handle_interaction(action, payload),
        }
    }

    fn handle_system(&mut self, action: &str) -> VigiaResult<Value> {
        match action {
            "connect" => Ok(json!({
                "windowId": self.connection.window_id(),
                "sessionId": self.connection.session_id(),
                "url": self.page.page_url(),
                "title": self.page.page_title(),
            })),
            "version" => Ok(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            })),
            "activate" => {
                self.connection.resume()?;
                Ok(json!({ "state": self.connection.state() }))
            }
            "deactivate" => {
                self.connection.pause()?;
                Ok(json!({ "state": self.connection.state() }))
            }
            "focus" => {
                self.page.focus_window()?;
                Ok(json!({ "focused": true }))
            }
            "reload" => {
                self.page.reload()?;
                Ok(json!({ "reloaded": true }))
            }
            other => Err(unknown_action("system", other)),
        }
    }

    fn handle_dom(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "query" => {
                let selector = str_field(payload, "selector")?;
                let elements: Vec<Value> = self
                    .page
                    .query_all(selector)
                    .into_iter()
                    .filter_map(|node| {
                        let info = self.page.element(node)?;
                        Some(json!({
                            "descriptor": descriptor::resolve(self.page.as_ref(), node).description,
                            "tag": info.tag,
                            "id": info.id,
                        }))
                    })
                    .collect();
                Ok(json!({ "count": elements.len(), "elements": elements }))
            }
            "inspect" => {
                let selector = str_field(payload, "selector")?;
                let node = self.locate(selector)?;
                let info = self
                    .page
                    .element(node)
                    .ok_or_else(|| VigiaError::not_found(selector))?;
                let visibility = match self.simulator.check_visible(node) {
                    Ok(()) => json!({ "visible": true }),
                    Err(err) => json!({ "visible": false, "reason": err.to_string() }),
                };
                Ok(json!({
                    "descriptor": descriptor::resolve(self.page.as_ref(), node).description,
                    "element": serde_json::to_value(info)?,
                    "style": serde_json::to_value(self.page.computed_style(node))?,
                    "visibility": visibility,
                }))
            }
            "highlight" => {
                let node = self.locate(str_field(payload, "selector")?)?;
                self.page.highlight(node)?;
                Ok(json!({ "highlighted": true }))
            }
            "tree" => {
                let root = match payload.get("selector").and_then(Value::as_str) {
                    Some(selector) => self.locate(selector)?,
                    None => self.page.document_root(),
                };
                let depth = payload
                    .get("depth")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_TREE_DEPTH);
                Ok(self.dom_tree(root, depth))
            }
            "screenshot-metadata" => self.page.screenshot_metadata(),
            other => Err(unknown_action("dom", other)),
        }
    }

    fn handle_events(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "watch" => {
                let kind = event_kind(str_field(payload, "event")?)?;
                self.watched_events.insert(kind);
                Ok(json!({ "watching": self.watched_events.len() }))
            }
            "unwatch" => {
                match payload.get("event").and_then(Value::as_str) {
                    Some(name) => {
                        self.watched_events.remove(&event_kind(name)?);
                    }
                    None => self.watched_events.clear(),
                }
                Ok(json!({ "watching": self.watched_events.len() }))
            }
            "dispatch" => {
                let selector = str_field(payload, "selector")?;
                let name = str_field(payload, "event")?;
                self.simulator.dispatch_named(selector, name)
            }
            other => Err(unknown_action("events", other)),
        }
    }

    fn handle_console_channel(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "get" => {
                let level = payload
                    .get("level")
                    .and_then(Value::as_str)
                    .map(ConsoleLevel::parse);
                Ok(serde_json::to_value(self.console.get(level))?)
            }
            "clear" => {
                self.console.clear();
                Ok(json!({ "cleared": true }))
            }
            other => Err(unknown_action("console", other)),
        }
    }

    fn handle_eval(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "run" | "execute" => {
                let code = str_field(payload, "code")?;
                self.page.eval(code)
            }
            other => Err(unknown_action("eval", other)),
        }
    }

    fn handle_recording(&mut self, action: &str) -> VigiaResult<Value> {
        match action {
            "start" => {
                let id = self.recorder.start()?;
                let event = SemanticEvent::new(
                    "recording:started",
                    EventCategory::Recording,
                    self.clock.now_ms(),
                )
                .with("id", json!(id));
                self.semantic.record(event);
                Ok(json!({ "id": id }))
            }
            "stop" => {
                let recording = self.recorder.stop()?;
                let event = SemanticEvent::new(
                    "recording:stopped",
                    EventCategory::Recording,
                    self.clock.now_ms(),
                )
                .with("id", json!(recording.id))
                .with("steps", json!(recording.steps.len()));
                self.semantic.record(event);
                Ok(serde_json::to_value(recording)?)
            }
            "replay" => self.recorder.replay(&mut self.simulator),
            "status" => Ok(self.recorder.status()),
            other => Err(unknown_action("recording", other)),
        }
    }

    fn handle_selection(&mut self, action: &str) -> VigiaResult<Value> {
        match action {
            "start" => {
                self.selection.start()?;
                Ok(self.selection.status())
            }
            "cancel" => {
                self.selection.cancel();
                Ok(self.selection.status())
            }
            "status" => Ok(self.selection.status()),
            "result" => Ok(serde_json::to_value(self.selection.result())?),
            "clear" => {
                self.selection.clear();
                Ok(self.selection.status())
            }
            other => Err(unknown_action("selection", other)),
        }
    }

    fn handle_navigation(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "refresh" => {
                self.page.reload()?;
                Ok(json!({ "reloaded": true }))
            }
            "goto" => {
                let url = str_field(payload, "url")?;
                self.page.navigate(url)?;
                Ok(json!({ "url": url }))
            }
            "location" => Ok(json!({
                "url": self.page.page_url(),
                "title": self.page.page_title(),
            })),
            other => Err(unknown_action("navigation", other)),
        }
    }

    fn handle_tabs(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "open" => {
                let url = str_field(payload, "url")?;
                let tab = self.page.open_tab(url)?;
                Ok(json!({ "tabId": tab }))
            }
            "close" => {
                self.page.close_tab(str_field(payload, "tabId")?)?;
                Ok(json!({ "closed": true }))
            }
            "focus" => {
                self.page.focus_tab(str_field(payload, "tabId")?)?;
                Ok(json!({ "focused": true }))
            }
            other => Err(unknown_action("tabs", other)),
        }
    }

    fn handle_mutations(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "watch" => {
                let config = if payload.is_null() {
                    MutationConfig::default()
                } else {
                    serde_json::from_value(payload.clone())?
                };
                self.mutations.watch(config);
                Ok(self.mutations.status())
            }
            "unwatch" => {
                self.mutations.unwatch();
                Ok(self.mutations.status())
            }
            "status" => Ok(self.mutations.status()),
            other => Err(unknown_action("mutations", other)),
        }
    }

    fn handle_semantic(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "start" => {
                self.apply_subscription(payload)?;
                self.semantic.start();
                Ok(self.semantic.status())
            }
            "stop" => {
                self.semantic.stop();
                Ok(self.semantic.status())
            }
            "subscribe" => {
                self.apply_subscription(payload)?;
                Ok(self.semantic.status())
            }
            "unsubscribe" => {
                self.semantic.unsubscribe();
                Ok(self.semantic.status())
            }
            "buffer" => Ok(serde_json::to_value(self.semantic.buffer_snapshot())?),
            "status" => Ok(self.semantic.status()),
            "stats" => Ok(self.semantic.stats()),
            other => Err(unknown_action("semantic", other)),
        }
    }

    fn handle_interaction(&mut self, action: &str, payload: &Value) -> VigiaResult<Value> {
        match action {
            "click" => {
                let selector = str_field(payload, "selector")?.to_string();
                let data = self.simulator.click(&selector)?;
                self.recorder.capture(RecordedStep::Click { selector });
                Ok(data)
            }
            "type" => {
                let selector = str_field(payload, "selector")?.to_string();
                let text = str_field(payload, "text")?.to_string();
                let opts: TypeOptions = serde_json::from_value(payload.clone())?;
                let data = self.simulator.type_text(&selector, &text, &opts)?;
                self.recorder.capture(RecordedStep::Type { selector, text });
                Ok(data)
            }
            "key" => {
                let combo = payload
                    .get("combo")
                    .or_else(|| payload.get("key"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| VigiaError::Protocol {
                        message: "missing field: combo".to_string(),
                    })?
                    .to_string();
                let repeat = payload
                    .get("repeat")
                    .and_then(Value::as_u64)
                    .map_or(1, |r| u32::try_from(r).unwrap_or(u32::MAX));
                let data = self.simulator.press_key(&combo, repeat)?;
                self.recorder.capture(RecordedStep::Key { combo, repeat });
                Ok(data)
            }
            other => Err(unknown_action("interaction", other)),
        }
    }

    fn apply_subscription(&mut self, payload: &Value) -> VigiaResult<()> {
        if let Some(name) = payload.get("preset").and_then(Value::as_str) {
            let preset = SubscriptionPreset::parse(name).ok_or_else(|| VigiaError::Protocol {
                message: format!("unknown preset: {name}"),
            })?;
            self.semantic.subscribe(Subscription::preset(preset));
        } else if let Some(categories) = payload.get("categories") {
            let categories: Vec<EventCategory> = serde_json::from_value(categories.clone())?;
            self.semantic.subscribe(Subscription::categories(categories));
        }
        Ok(())
    }

    fn locate(&self, selector: &str) -> VigiaResult<NodeId> {
        self.page
            .query(selector)
            .ok_or_else(|| VigiaError::not_found(selector))
    }

    fn dom_tree(&self, node: NodeId, depth: u64) -> Value {
        let Some(info) = self.page.element(node) else {
            return Value::Null;
        };
        let children: Vec<Value> = if depth == 0 {
            Vec::new()
        } else {
            self.page
                .children(node)
                .into_iter()
                .map(|child| self.dom_tree(child, depth - 1))
                .collect()
        };
        json!({
            "tag": info.tag,
            "id": info.id,
            "classes": info.classes,
            "children": children,
        })
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> VigiaResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| VigiaError::Protocol {
            message: format!("missing field: {key}"),
        })
}

fn unknown_action(channel: &str, action: &str) -> VigiaError {
    VigiaError::Protocol {
        message: format!("unknown {channel} action: {action}"),
    }
}

fn event_kind(name: &str) -> VigiaResult<RawEventKind> {
    serde_json::from_value(Value::String(name.to_string())).map_err(|_| VigiaError::Protocol {
        message: format!("unknown event kind: {name}"),
    })
}
