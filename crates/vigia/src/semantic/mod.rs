//! Semantic event engine.
//!
//! Turns capture-phase raw listeners into a compact, classified event stream:
//! typing, scrolling, hovering, and text selection are debounced; drags are
//! derived from mousedown/mouseup pairs; structural signals (clicks, form
//! actions, focus, clipboard, history, failed fetches) are classified
//! immediately. Events land in a fixed-capacity ring buffer behind a
//! subscription filter, while per-category counters keep incrementing
//! regardless of the subscription to drive the noise-reduction statistic.

pub mod event;
pub mod subscription;

pub use event::{CategoryCounters, EventBuffer, EventCategory, SemanticEvent};
pub use subscription::{Subscription, SubscriptionPreset};

use serde_json::{json, Value};
use tracing::debug;

use crate::clock::ClockHandle;
use crate::debounce::Debouncer;
use crate::descriptor;
use crate::page::{
    ClipboardOp, ListenerRegistry, NodeId, PageHandle, RawEvent, RawEventKind,
};

/// Quiet period after the last keystroke before a typing event is emitted.
pub const TYPING_QUIET_MS: u64 = 500;
/// Quiet period after the last scroll signal.
pub const SCROLL_QUIET_MS: u64 = 150;
/// Minimum net vertical movement for a `scroll:stop` event.
pub const SCROLL_MIN_DISTANCE: f32 = 50.0;
/// Continuous hover duration before a `hover:dwell` event.
pub const HOVER_DWELL_MS: u64 = 300;
/// Quiet period after the last selection change.
pub const SELECTION_QUIET_MS: u64 = 300;
/// Minimum selection length reported.
pub const SELECTION_MIN_CHARS: usize = 2;
/// Minimum movement for a drag to be reported.
pub const DRAG_MIN_DISTANCE: f32 = 10.0;
/// Minimum hold duration for a drag to be reported.
pub const DRAG_MIN_HOLD_MS: u64 = 200;

#[derive(Debug)]
struct TypingState {
    target: NodeId,
    started_ms: u64,
    value: String,
}

#[derive(Debug)]
struct ScrollState {
    start_y: f32,
    started_ms: u64,
    last_y: f32,
}

#[derive(Debug)]
struct HoverState {
    target: NodeId,
    entered_ms: u64,
    dwell_emitted: bool,
}

#[derive(Debug)]
struct DragState {
    target: NodeId,
    x: f32,
    y: f32,
    started_ms: u64,
}

/// The semantic event engine.
pub struct SemanticEngine {
    page: PageHandle,
    clock: ClockHandle,
    buffer: EventBuffer,
    counters: CategoryCounters,
    subscription: Subscription,
    listeners: ListenerRegistry,
    running: bool,
    typing: Debouncer<TypingState>,
    scroll: Debouncer<ScrollState>,
    selection: Debouncer<String>,
    hover: Option<HoverState>,
    dwell: Debouncer<NodeId>,
    drag: Option<DragState>,
    outbox: Vec<SemanticEvent>,
}

impl std::fmt::Debug for SemanticEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticEngine")
            .field("running", &self.running)
            .field("buffered", &self.buffer.len())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl SemanticEngine {
    /// Create a stopped engine.
    #[must_use]
    pub fn new(page: PageHandle, clock: ClockHandle) -> Self {
        Self {
            page,
            clock,
            buffer: EventBuffer::default(),
            counters: CategoryCounters::new(),
            subscription: Subscription::all(),
            listeners: ListenerRegistry::new(),
            running: false,
            typing: Debouncer::new(TYPING_QUIET_MS),
            scroll: Debouncer::new(SCROLL_QUIET_MS),
            selection: Debouncer::new(SELECTION_QUIET_MS),
            hover: None,
            dwell: Debouncer::new(HOVER_DWELL_MS),
            drag: None,
            outbox: Vec::new(),
        }
    }

    /// Whether the engine is classifying.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Attach listeners and begin classifying.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.listeners.attach_all(self.page.as_ref(), RawEventKind::ALL);
        self.running = true;
        debug!(listeners = self.listeners.len(), "semantic engine started");
    }

    /// Flush all open debounce states, then detach listeners.
    ///
    /// Final typing/scroll/hover events are emitted before the engine goes
    /// quiet (the mutation engine deliberately does the opposite).
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let now = self.clock.now_ms();
        self.flush_typing(now);
        self.flush_scroll(now);
        self.flush_selection(now);
        self.flush_hover_leave(now);
        self.drag = None;
        self.listeners.detach_all(self.page.as_ref());
        self.running = false;
        debug!("semantic engine stopped");
    }

    /// Replace the active subscription.
    pub fn subscribe(&mut self, subscription: Subscription) {
        self.subscription = subscription;
    }

    /// Reset the subscription to allow everything.
    pub fn unsubscribe(&mut self) {
        self.subscription = Subscription::all();
    }

    /// Active subscription.
    #[must_use]
    pub const fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Counters behind the noise-reduction statistic.
    #[must_use]
    pub const fn counters(&self) -> &CategoryCounters {
        &self.counters
    }

    /// Snapshot of the ring buffer, oldest first.
    #[must_use]
    pub fn buffer_snapshot(&self) -> Vec<SemanticEvent> {
        self.buffer.snapshot()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drain events queued for forwarding since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<SemanticEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Status summary for the protocol.
    #[must_use]
    pub fn status(&self) -> Value {
        json!({
            "running": self.running,
            "buffered": self.buffer.len(),
            "capacity": self.buffer.capacity(),
            "subscription": self.subscription,
        })
    }

    /// Counter summary plus the noise-reduction ratio.
    #[must_use]
    pub fn stats(&self) -> Value {
        json!({
            "raw": self.counters.raw,
            "semantic": self.counters.semantic,
            "perCategory": self.counters.per_category,
            "noiseReduction": self.counters.noise_reduction(),
        })
    }

    /// Record an externally produced event (mutation batches, recording
    /// lifecycle) through the same counter/subscription path.
    pub fn record(&mut self, event: SemanticEvent) {
        self.emit(event);
    }

    /// Feed one raw platform signal through the classifiers.
    pub fn handle_raw(&mut self, raw: &RawEvent) {
        if !self.running {
            return;
        }
        // Signals from the engine's own widget never reach the classifiers.
        if let Some(target) = raw.target() {
            if self.page.in_widget_subtree(target) {
                return;
            }
        }
        self.counters.count_raw();
        let now = self.clock.now_ms();
        match raw {
            RawEvent::KeyDown { target, value, .. } => self.on_keydown(*target, value, now),
            RawEvent::FieldChange { target, .. } => self.on_field_change(*target, now),
            RawEvent::Click { target } => self.on_click(*target, now),
            RawEvent::Scroll { y } => self.on_scroll(*y, now),
            RawEvent::MouseOver { target } => self.on_mouse_over(*target, now),
            RawEvent::MouseOut { target } => self.on_mouse_out(*target, now),
            RawEvent::MouseDown { target, x, y } => {
                self.drag = Some(DragState {
                    target: *target,
                    x: *x,
                    y: *y,
                    started_ms: now,
                });
            }
            RawEvent::MouseUp { x, y, .. } => self.on_mouse_up(*x, *y, now),
            RawEvent::Submit { target } => {
                let event = self
                    .classified("interaction:submit", EventCategory::Interaction, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target));
                self.emit(event);
            }
            RawEvent::FormReset { target } => {
                let event = self
                    .classified("interaction:reset", EventCategory::Interaction, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target));
                self.emit(event);
            }
            RawEvent::FormInvalid { target, validity } => {
                let event = self
                    .classified("input:invalid", EventCategory::Input, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target))
                    .with("validity", json!(validity));
                self.emit(event);
            }
            RawEvent::FocusIn { target } => {
                let event = self
                    .classified("focus:in", EventCategory::Focus, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target));
                self.emit(event);
            }
            RawEvent::FocusOut { target } => {
                // A field losing focus also commits any pending typing.
                if self.typing.pending().is_some_and(|t| t.target == *target) {
                    self.flush_typing(now);
                }
                let event = self
                    .classified("focus:out", EventCategory::Focus, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target));
                self.emit(event);
            }
            RawEvent::Clipboard {
                target,
                op,
                selection,
            } => {
                let name = match op {
                    ClipboardOp::Cut => "interaction:cut",
                    ClipboardOp::Copy => "interaction:copy",
                    ClipboardOp::Paste => "interaction:paste",
                };
                let event = self
                    .classified(name, EventCategory::Interaction, now)
                    .with_target(descriptor::resolve(self.page.as_ref(), *target))
                    .with("selection", json!(selection));
                self.emit(event);
            }
            RawEvent::SelectionChange { text } => {
                self.selection.arm(text.clone(), now);
            }
            RawEvent::HistoryNavigation { url } => {
                let event = self
                    .classified("navigation:history", EventCategory::Navigation, now)
                    .with("url", json!(url));
                self.emit(event);
            }
            RawEvent::FetchFailed {
                url,
                status,
                message,
            } => {
                let event = self
                    .classified("console:network-error", EventCategory::Console, now)
                    .with("url", json!(url))
                    .with("status", json!(status))
                    .with("message", json!(message));
                self.emit(event);
            }
        }
    }

    /// Run due debounce timers. Call on every cooperative tick.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let now = self.clock.now_ms();
        if self.typing.is_due(now) {
            self.flush_typing(now);
        }
        if self.scroll.is_due(now) {
            self.flush_scroll(now);
        }
        if self.selection.is_due(now) {
            self.flush_selection(now);
        }
        if let Some(target) = self.dwell.take_if_due(now) {
            self.emit_dwell(target, now);
        }
    }

    // --- classifiers ---

    fn on_keydown(&mut self, target: NodeId, value: &str, now: u64) {
        let Some(info) = self.page.element(target) else {
            return;
        };
        if !info.accepts_typing() {
            return;
        }
        // A field switch flushes the previous field first.
        if self.typing.pending().is_some_and(|t| t.target != target) {
            self.flush_typing(now);
        }
        if self.typing.is_pending() {
            if let Some(state) = self.typing.pending_mut() {
                state.value = value.to_string();
            }
            self.typing.touch(now);
        } else {
            self.typing.arm(
                TypingState {
                    target,
                    started_ms: now,
                    value: value.to_string(),
                },
                now,
            );
        }
    }

    fn on_field_change(&mut self, target: NodeId, now: u64) {
        if self.typing.pending().is_some_and(|t| t.target == target) {
            self.flush_typing(now);
        }
    }

    fn on_click(&mut self, target: NodeId, now: u64) {
        let Some(info) = self.page.element(target) else {
            return;
        };
        // Checkbox/radio toggles surface through change events instead.
        if info.is_toggle() {
            return;
        }
        let event = self
            .classified("interaction:click", EventCategory::Interaction, now)
            .with_target(descriptor::resolve(self.page.as_ref(), target));
        self.emit(event);
    }

    fn on_scroll(&mut self, y: f32, now: u64) {
        if self.scroll.is_pending() {
            if let Some(state) = self.scroll.pending_mut() {
                state.last_y = y;
            }
            self.scroll.touch(now);
        } else {
            self.scroll.arm(
                ScrollState {
                    start_y: y,
                    started_ms: now,
                    last_y: y,
                },
                now,
            );
        }
    }

    fn on_mouse_over(&mut self, target: NodeId, now: u64) {
        if self.hover.as_ref().is_some_and(|h| h.target == target) {
            return;
        }
        self.flush_hover_leave(now);
        let event = self
            .classified("hover:enter", EventCategory::Hover, now)
            .with_target(descriptor::resolve(self.page.as_ref(), target));
        self.emit(event);
        self.hover = Some(HoverState {
            target,
            entered_ms: now,
            dwell_emitted: false,
        });
        self.dwell.arm(target, now);
    }

    fn on_mouse_out(&mut self, target: NodeId, now: u64) {
        if self.hover.as_ref().is_some_and(|h| h.target == target) {
            self.flush_hover_leave(now);
        }
    }

    fn on_mouse_up(&mut self, x: f32, y: f32, now: u64) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let dx = x - drag.x;
        let dy = y - drag.y;
        let distance = dx.hypot(dy);
        let duration = now.saturating_sub(drag.started_ms);
        if distance <= DRAG_MIN_DISTANCE && duration <= DRAG_MIN_HOLD_MS {
            return;
        }
        // Direction is the sign of the dominant axis.
        let direction = if dx.abs() >= dy.abs() {
            if dx >= 0.0 { "right" } else { "left" }
        } else if dy >= 0.0 {
            "down"
        } else {
            "up"
        };
        let event = self
            .classified("interaction:drag", EventCategory::Interaction, now)
            .with_target(descriptor::resolve(self.page.as_ref(), drag.target))
            .with("distance", json!(distance))
            .with("durationMs", json!(duration))
            .with("direction", json!(direction));
        self.emit(event);
    }

    // --- flushes ---

    fn flush_typing(&mut self, now: u64) {
        let Some(state) = self.typing.take() else {
            return;
        };
        let duration = now.saturating_sub(state.started_ms);
        let (name, value) = if state.value.is_empty() {
            ("input:cleared", String::new())
        } else {
            ("input:typed", state.value)
        };
        let event = self
            .classified(name, EventCategory::Input, now)
            .with_target(descriptor::resolve(self.page.as_ref(), state.target))
            .with("value", json!(value))
            .with("durationMs", json!(duration));
        self.emit(event);
    }

    fn flush_scroll(&mut self, now: u64) {
        let Some(state) = self.scroll.take() else {
            return;
        };
        let delta = state.last_y - state.start_y;
        if delta.abs() <= SCROLL_MIN_DISTANCE {
            return;
        }
        let duration = now.saturating_sub(state.started_ms);
        let direction = if delta > 0.0 { "down" } else { "up" };
        let landing = self.scroll_landing();
        let event = self
            .classified("scroll:stop", EventCategory::Scroll, now)
            .with("direction", json!(direction))
            .with("distance", json!(delta.abs()))
            .with("durationMs", json!(duration))
            .with("landing", json!(landing));
        self.emit(event);
    }

    /// Best-effort description of where the scroll landed.
    fn scroll_landing(&self) -> String {
        let (_, y) = self.page.scroll_position();
        if y <= 0.0 {
            return "top".to_string();
        }
        let viewport = self.page.viewport();
        if y + viewport.height >= self.page.document_height() - 1.0 {
            return "bottom".to_string();
        }
        self.page
            .element_at_viewport_center()
            .map_or_else(String::new, |n| {
                descriptor::resolve(self.page.as_ref(), n).description
            })
    }

    fn flush_selection(&mut self, _now: u64) {
        let Some(text) = self.selection.take() else {
            return;
        };
        if text.chars().count() < SELECTION_MIN_CHARS {
            return;
        }
        let now = self.clock.now_ms();
        let event = self
            .classified("interaction:selection", EventCategory::Interaction, now)
            .with("text", json!(text))
            .with("length", json!(text.chars().count()));
        self.emit(event);
    }

    fn flush_hover_leave(&mut self, now: u64) {
        self.dwell.cancel();
        let Some(state) = self.hover.take() else {
            return;
        };
        let dwell_time = now.saturating_sub(state.entered_ms);
        let event = self
            .classified("hover:leave", EventCategory::Hover, now)
            .with_target(descriptor::resolve(self.page.as_ref(), state.target))
            .with("dwellTime", json!(dwell_time));
        self.emit(event);
    }

    fn emit_dwell(&mut self, target: NodeId, now: u64) {
        let Some(state) = self.hover.as_mut() else {
            return;
        };
        if state.target != target || state.dwell_emitted {
            return;
        }
        state.dwell_emitted = true;
        let interactive = self
            .page
            .element(target)
            .is_some_and(|info| info.is_interactive());
        let event = self
            .classified("hover:dwell", EventCategory::Hover, now)
            .with_target(descriptor::resolve(self.page.as_ref(), target))
            .with("interactive", json!(interactive));
        self.emit(event);
    }

    // --- emission ---

    fn classified(
        &self,
        event_type: &str,
        category: EventCategory,
        now: u64,
    ) -> SemanticEvent {
        SemanticEvent::new(event_type, category, now)
    }

    fn emit(&mut self, event: SemanticEvent) {
        self.counters.count_semantic(event.category);
        if self.subscription.allows(event.category) {
            self.buffer.push(event.clone());
            self.outbox.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::page::fake::FakePage;
    use crate::page::{RawEvent, ValidityFlags};
    use std::sync::Arc;

    struct Fixture {
        page: Arc<FakePage>,
        clock: Arc<FakeClock>,
        engine: SemanticEngine,
    }

    fn fixture() -> Fixture {
        let page = FakePage::shared();
        let clock = FakeClock::handle_at(1_000);
        let mut engine = SemanticEngine::new(page.clone(), clock.clone());
        engine.start();
        Fixture {
            page,
            clock,
            engine,
        }
    }

    fn text_input(page: &FakePage) -> crate::page::NodeId {
        let n = page.add_element(None, "input");
        page.set_attr(n, "name", "q");
        n
    }

    mod typing_tests {
        use super::*;

        #[test]
        fn keystrokes_coalesce_into_one_typed_event() {
            let mut f = fixture();
            let field = text_input(&f.page);
            for (i, value) in ["h", "he", "hel", "hell", "hello"].iter().enumerate() {
                f.clock.set(1_000 + i as u64 * 100);
                f.engine.handle_raw(&RawEvent::KeyDown {
                    target: field,
                    key: "x".to_string(),
                    value: (*value).to_string(),
                });
            }
            assert_eq!(f.engine.buffered(), 0, "nothing before quiet period");
            f.clock.advance(TYPING_QUIET_MS);
            f.engine.tick();

            let events = f.engine.buffer_snapshot();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type, "input:typed");
            assert_eq!(events[0].payload["value"], "hello");
        }

        #[test]
        fn empty_final_value_emits_cleared() {
            let mut f = fixture();
            let field = text_input(&f.page);
            f.engine.handle_raw(&RawEvent::KeyDown {
                target: field,
                key: "Backspace".to_string(),
                value: String::new(),
            });
            f.clock.advance(TYPING_QUIET_MS);
            f.engine.tick();
            assert_eq!(f.engine.buffer_snapshot()[0].event_type, "input:cleared");
        }

        #[test]
        fn field_switch_flushes_previous_field() {
            let mut f = fixture();
            let first = text_input(&f.page);
            let second = text_input(&f.page);
            f.engine.handle_raw(&RawEvent::KeyDown {
                target: first,
                key: "a".to_string(),
                value: "a".to_string(),
            });
            f.clock.advance(100);
            f.engine.handle_raw(&RawEvent::KeyDown {
                target: second,
                key: "b".to_string(),
                value: "b".to_string(),
            });
            let events = f.engine.buffer_snapshot();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].payload["value"], "a");
        }

        #[test]
        fn checkbox_keystrokes_are_ignored() {
            let mut f = fixture();
            let cb = f.page.add_element(None, "input");
            f.page.set_input_type(cb, "checkbox");
            f.engine.handle_raw(&RawEvent::KeyDown {
                target: cb,
                key: " ".to_string(),
                value: "on".to_string(),
            });
            f.clock.advance(TYPING_QUIET_MS);
            f.engine.tick();
            assert_eq!(f.engine.buffered(), 0);
        }
    }

    mod scroll_tests {
        use super::*;

        #[test]
        fn scroll_coalesces_into_one_stop_event() {
            let mut f = fixture();
            f.page.set_scroll(0.0, 200.0);
            for step in [50.0_f32, 100.0, 150.0, 200.0] {
                f.engine.handle_raw(&RawEvent::Scroll { y: step });
                f.clock.advance(20);
            }
            f.clock.advance(SCROLL_QUIET_MS);
            f.engine.tick();

            let events = f.engine.buffer_snapshot();
            assert_eq!(events.len(), 1);
            let e = &events[0];
            assert_eq!(e.event_type, "scroll:stop");
            assert_eq!(e.payload["direction"], "down");
            assert_eq!(e.payload["distance"], 150.0);
        }

        #[test]
        fn small_scrolls_are_suppressed() {
            let mut f = fixture();
            f.engine.handle_raw(&RawEvent::Scroll { y: 0.0 });
            f.engine.handle_raw(&RawEvent::Scroll { y: 30.0 });
            f.clock.advance(SCROLL_QUIET_MS);
            f.engine.tick();
            assert_eq!(f.engine.buffered(), 0);
        }

        #[test]
        fn landing_reports_top() {
            let mut f = fixture();
            f.page.set_scroll(0.0, 0.0);
            f.engine.handle_raw(&RawEvent::Scroll { y: 300.0 });
            f.engine.handle_raw(&RawEvent::Scroll { y: 0.0 });
            // Net movement is 300 down then back: delta is 0 - 300... start
            // is the first observed position, so delta = -300 (up).
            f.clock.advance(SCROLL_QUIET_MS);
            f.engine.tick();
            let events = f.engine.buffer_snapshot();
            assert_eq!(events[0].payload["direction"], "up");
            assert_eq!(events[0].payload["landing"], "top");
        }
    }

    mod hover_tests {
        use super::*;

        #[test]
        fn enter_dwell_leave_sequence() {
            let mut f = fixture();
            let button = f.page.add_element(None, "button");
            f.page.set_text(button, "Go");

            f.engine.handle_raw(&RawEvent::MouseOver { target: button });
            f.clock.advance(400);
            f.engine.tick();
            f.engine.tick(); // no duplicate dwell
            f.engine.handle_raw(&RawEvent::MouseOut { target: button });

            let types: Vec<_> = f
                .engine
                .buffer_snapshot()
                .iter()
                .map(|e| e.event_type.clone())
                .collect();
            assert_eq!(types, vec!["hover:enter", "hover:dwell", "hover:leave"]);

            let events = f.engine.buffer_snapshot();
            assert_eq!(events[1].payload["interactive"], true);
            assert_eq!(events[2].payload["dwellTime"], 400);
        }

        #[test]
        fn new_target_flushes_previous_hover() {
            let mut f = fixture();
            let a = f.page.add_element(None, "div");
            let b = f.page.add_element(None, "div");
            f.engine.handle_raw(&RawEvent::MouseOver { target: a });
            f.clock.advance(50);
            f.engine.handle_raw(&RawEvent::MouseOver { target: b });

            let types: Vec<_> = f
                .engine
                .buffer_snapshot()
                .iter()
                .map(|e| e.event_type.clone())
                .collect();
            assert_eq!(types, vec!["hover:enter", "hover:leave", "hover:enter"]);
        }

        #[test]
        fn quick_pass_has_no_dwell() {
            let mut f = fixture();
            let a = f.page.add_element(None, "div");
            f.engine.handle_raw(&RawEvent::MouseOver { target: a });
            f.clock.advance(100);
            f.engine.handle_raw(&RawEvent::MouseOut { target: a });
            f.clock.advance(HOVER_DWELL_MS);
            f.engine.tick();
            let types: Vec<_> = f
                .engine
                .buffer_snapshot()
                .iter()
                .map(|e| e.event_type.clone())
                .collect();
            assert_eq!(types, vec!["hover:enter", "hover:leave"]);
        }
    }

    mod drag_tests {
        use super::*;

        #[test]
        fn long_drag_reports_direction() {
            let mut f = fixture();
            let el = f.page.add_element(None, "div");
            f.engine.handle_raw(&RawEvent::MouseDown {
                target: el,
                x: 10.0,
                y: 10.0,
            });
            f.clock.advance(50);
            f.engine.handle_raw(&RawEvent::MouseUp {
                target: el,
                x: 110.0,
                y: 30.0,
            });
            let events = f.engine.buffer_snapshot();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type, "interaction:drag");
            assert_eq!(events[0].payload["direction"], "right");
        }

        #[test]
        fn short_quick_press_is_not_a_drag() {
            let mut f = fixture();
            let el = f.page.add_element(None, "div");
            f.engine.handle_raw(&RawEvent::MouseDown {
                target: el,
                x: 10.0,
                y: 10.0,
            });
            f.clock.advance(50);
            f.engine.handle_raw(&RawEvent::MouseUp {
                target: el,
                x: 12.0,
                y: 11.0,
            });
            assert_eq!(f.engine.buffered(), 0);
        }

        #[test]
        fn long_hold_without_movement_is_a_drag() {
            let mut f = fixture();
            let el = f.page.add_element(None, "div");
            f.engine.handle_raw(&RawEvent::MouseDown {
                target: el,
                x: 10.0,
                y: 10.0,
            });
            f.clock.advance(300);
            f.engine.handle_raw(&RawEvent::MouseUp {
                target: el,
                x: 10.0,
                y: 10.0,
            });
            assert_eq!(f.engine.buffered(), 1);
        }
    }

    mod subscription_tests {
        use super::*;

        #[test]
        fn minimal_filters_buffer_but_not_counters() {
            let mut f = fixture();
            f.engine
                .subscribe(Subscription::preset(SubscriptionPreset::Minimal));

            let button = f.page.add_element(None, "button");
            f.engine.handle_raw(&RawEvent::Click { target: button });
            f.engine.handle_raw(&RawEvent::FocusIn { target: button });
            f.engine.handle_raw(&RawEvent::MouseOver { target: button });

            let categories: Vec<_> = f
                .engine
                .buffer_snapshot()
                .iter()
                .map(|e| e.category)
                .collect();
            assert_eq!(categories, vec![EventCategory::Interaction]);

            // Counters incremented even for filtered categories.
            assert_eq!(f.engine.counters().category(EventCategory::Focus), 1);
            assert_eq!(f.engine.counters().category(EventCategory::Hover), 1);
        }
    }

    mod structural_tests {
        use super::*;

        #[test]
        fn widget_events_are_ignored_entirely() {
            let mut f = fixture();
            let panel = f.page.add_element(None, "div");
            f.page.mark_widget(panel);
            let inner = f.page.add_element(Some(panel), "button");
            f.engine.handle_raw(&RawEvent::Click { target: inner });
            assert_eq!(f.engine.buffered(), 0);
            assert_eq!(f.engine.counters().raw, 0);
        }

        #[test]
        fn checkbox_click_is_excluded() {
            let mut f = fixture();
            let cb = f.page.add_element(None, "input");
            f.page.set_input_type(cb, "checkbox");
            f.engine.handle_raw(&RawEvent::Click { target: cb });
            assert_eq!(f.engine.buffered(), 0);
        }

        #[test]
        fn invalid_form_carries_validity_flags() {
            let mut f = fixture();
            let field = text_input(&f.page);
            let validity = ValidityFlags {
                value_missing: true,
                ..ValidityFlags::default()
            };
            f.engine.handle_raw(&RawEvent::FormInvalid {
                target: field,
                validity,
            });
            let events = f.engine.buffer_snapshot();
            assert_eq!(events[0].event_type, "input:invalid");
            assert_eq!(events[0].payload["validity"]["value_missing"], true);
        }

        #[test]
        fn failed_fetch_surfaces_as_console_category() {
            let mut f = fixture();
            f.engine.handle_raw(&RawEvent::FetchFailed {
                url: "/api/items".to_string(),
                status: Some(503),
                message: "Service Unavailable".to_string(),
            });
            let events = f.engine.buffer_snapshot();
            assert_eq!(events[0].category, EventCategory::Console);
            assert_eq!(events[0].payload["status"], 503);
        }

        #[test]
        fn short_selection_is_suppressed() {
            let mut f = fixture();
            f.engine.handle_raw(&RawEvent::SelectionChange {
                text: "a".to_string(),
            });
            f.clock.advance(SELECTION_QUIET_MS);
            f.engine.tick();
            assert_eq!(f.engine.buffered(), 0);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn start_attaches_and_stop_detaches_listeners() {
            let page = FakePage::shared();
            let clock = FakeClock::handle_at(0);
            let mut engine = SemanticEngine::new(page.clone(), clock);
            assert_eq!(page.listener_count(), 0);
            engine.start();
            assert_eq!(page.listener_count(), RawEventKind::ALL.len());
            engine.stop();
            assert_eq!(page.listener_count(), 0);
        }

        #[test]
        fn stop_flushes_pending_typing() {
            let mut f = fixture();
            let field = text_input(&f.page);
            f.engine.handle_raw(&RawEvent::KeyDown {
                target: field,
                key: "a".to_string(),
                value: "abc".to_string(),
            });
            f.engine.stop();
            let events = f.engine.buffer_snapshot();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].payload["value"], "abc");
        }
    }
}
