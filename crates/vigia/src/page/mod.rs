//! Platform adapter boundary.
//!
//! The engine observes and drives a DOM it does not own. Everything it needs
//! from the host platform (queries, element geometry, computed style, event
//! dispatch, value mutation, shadow-root discovery) goes through the
//! [`PageAdapter`] trait so classification, filtering, and batching logic can
//! be unit-tested against the in-memory [`fake::FakePage`].

pub mod fake;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::result::{VigiaError, VigiaResult};

/// Opaque handle to an element owned by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle has zero area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether this rectangle intersects another.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

/// Computed style subset consulted by the visibility check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedStyle {
    /// `display` value
    pub display: String,
    /// `visibility` value
    pub visibility: String,
    /// `opacity` value
    pub opacity: f32,
    /// `pointer-events` value
    pub pointer_events: String,
    /// `clip-path` value
    pub clip_path: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            pointer_events: "auto".to_string(),
            clip_path: "none".to_string(),
        }
    }
}

/// Snapshot of an element as seen through the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Lowercase tag name
    pub tag: String,
    /// `id` attribute, if present and nonempty
    pub id: Option<String>,
    /// Class list tokens
    pub classes: Vec<String>,
    /// All attributes except `id` and `class`
    pub attributes: BTreeMap<String, String>,
    /// Visible text content (trimmed)
    pub text: String,
    /// `type` attribute for inputs
    pub input_type: Option<String>,
    /// Current value for form controls
    pub value: Option<String>,
    /// Whether the element is content-editable
    pub content_editable: bool,
    /// Bounding box in viewport coordinates
    pub bounds: Rect,
}

/// Input types that never receive coalesced typing events.
const NON_TYPING_INPUT_TYPES: &[&str] = &[
    "checkbox", "radio", "range", "color", "date", "time", "file",
];

/// Tags whose appearance or removal is always worth reporting.
const SIGNIFICANT_TAGS: &[&str] = &[
    "dialog", "form", "button", "a", "input", "select", "textarea",
];

impl ElementInfo {
    /// Whether keystrokes on this element should coalesce into typing events.
    ///
    /// Text-entry fields and content-editable hosts only; toggles, pickers,
    /// and file inputs are excluded.
    #[must_use]
    pub fn accepts_typing(&self) -> bool {
        if self.content_editable {
            return true;
        }
        match self.tag.as_str() {
            "textarea" => true,
            "input" => {
                let ty = self.input_type.as_deref().unwrap_or("text");
                !NON_TYPING_INPUT_TYPES.contains(&ty)
            }
            _ => false,
        }
    }

    /// Whether this is a checkbox or radio input.
    #[must_use]
    pub fn is_toggle(&self) -> bool {
        self.tag == "input"
            && matches!(self.input_type.as_deref(), Some("checkbox" | "radio"))
    }

    /// Whether the element is conventionally interactive.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "a" | "button" | "input" | "select" | "textarea" | "summary" | "label"
        ) || self.attributes.contains_key("onclick")
            || self.attributes.get("role").is_some_and(|r| {
                matches!(
                    r.as_str(),
                    "button" | "link" | "checkbox" | "menuitem" | "tab" | "switch"
                )
            })
    }

    /// Whether the tag alone makes a structural change notable.
    #[must_use]
    pub fn is_significant_tag(&self) -> bool {
        SIGNIFICANT_TAGS.contains(&self.tag.as_str())
    }

    /// Attribute lookup.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the class list contains a token.
    #[must_use]
    pub fn has_class(&self, token: &str) -> bool {
        self.classes.iter().any(|c| c == token)
    }
}

/// Validity-state flags attached to `invalid` form events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityFlags {
    /// Required field left empty
    pub value_missing: bool,
    /// Value does not match the input type
    pub type_mismatch: bool,
    /// Value does not match the `pattern` attribute
    pub pattern_mismatch: bool,
    /// Value exceeds `maxlength`
    pub too_long: bool,
    /// Value is below `minlength`
    pub too_short: bool,
    /// Numeric value below `min`
    pub range_underflow: bool,
    /// Numeric value above `max`
    pub range_overflow: bool,
    /// Value does not align to `step`
    pub step_mismatch: bool,
    /// Value the platform could not parse
    pub bad_input: bool,
    /// Custom validity message set by script
    pub custom_error: bool,
}

/// Clipboard operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardOp {
    /// Cut to clipboard
    Cut,
    /// Copy to clipboard
    Copy,
    /// Paste from clipboard
    Paste,
}

impl ClipboardOp {
    /// Platform event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Cut => "cut",
            Self::Copy => "copy",
            Self::Paste => "paste",
        }
    }
}

/// Kinds of raw capture-phase signals the engine can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    /// Keystroke in a field
    KeyDown,
    /// Mouse click
    Click,
    /// Document scroll
    Scroll,
    /// Pointer entered an element
    MouseOver,
    /// Pointer left an element
    MouseOut,
    /// Mouse button pressed
    MouseDown,
    /// Mouse button released
    MouseUp,
    /// Field value committed
    Change,
    /// Form submitted
    Submit,
    /// Form reset
    Reset,
    /// Form control failed validation
    Invalid,
    /// Element gained focus
    FocusIn,
    /// Element lost focus
    FocusOut,
    /// Cut to clipboard
    Cut,
    /// Copy to clipboard
    Copy,
    /// Paste from clipboard
    Paste,
    /// Text selection changed
    SelectionChange,
    /// History navigation (back/forward)
    PopState,
    /// Fetch completed with a failure
    FetchFailed,
}

impl RawEventKind {
    /// All kinds the semantic engine listens for.
    pub const ALL: &'static [Self] = &[
        Self::KeyDown,
        Self::Click,
        Self::Scroll,
        Self::MouseOver,
        Self::MouseOut,
        Self::MouseDown,
        Self::MouseUp,
        Self::Change,
        Self::Submit,
        Self::Reset,
        Self::Invalid,
        Self::FocusIn,
        Self::FocusOut,
        Self::Cut,
        Self::Copy,
        Self::Paste,
        Self::SelectionChange,
        Self::PopState,
        Self::FetchFailed,
    ];
}

/// A raw capture-phase signal delivered by the host platform.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// Keystroke in a field; `value` is the field value after the keystroke.
    KeyDown {
        /// Event target
        target: NodeId,
        /// Key name
        key: String,
        /// Field value after the keystroke
        value: String,
    },
    /// Mouse click.
    Click {
        /// Event target
        target: NodeId,
    },
    /// Document scroll to a new vertical position.
    Scroll {
        /// New vertical scroll position
        y: f32,
    },
    /// Pointer entered an element.
    MouseOver {
        /// Event target
        target: NodeId,
    },
    /// Pointer left an element.
    MouseOut {
        /// Event target
        target: NodeId,
    },
    /// Mouse button pressed.
    MouseDown {
        /// Event target
        target: NodeId,
        /// Viewport X
        x: f32,
        /// Viewport Y
        y: f32,
    },
    /// Mouse button released.
    MouseUp {
        /// Event target
        target: NodeId,
        /// Viewport X
        x: f32,
        /// Viewport Y
        y: f32,
    },
    /// Field value committed (blur or picker close).
    FieldChange {
        /// Event target
        target: NodeId,
        /// Committed value
        value: String,
    },
    /// Form submitted.
    Submit {
        /// Form element
        target: NodeId,
    },
    /// Form reset.
    FormReset {
        /// Form element
        target: NodeId,
    },
    /// Form control failed validation.
    FormInvalid {
        /// Control element
        target: NodeId,
        /// Validity-state flags
        validity: ValidityFlags,
    },
    /// Element gained focus.
    FocusIn {
        /// Event target
        target: NodeId,
    },
    /// Element lost focus.
    FocusOut {
        /// Event target
        target: NodeId,
    },
    /// Clipboard operation with the current selection text.
    Clipboard {
        /// Event target
        target: NodeId,
        /// Cut, copy, or paste
        op: ClipboardOp,
        /// Selection text at the time of the operation
        selection: String,
    },
    /// Text selection changed.
    SelectionChange {
        /// Selected text
        text: String,
    },
    /// History navigation (back/forward).
    HistoryNavigation {
        /// URL after navigation
        url: String,
    },
    /// Fetch returned non-2xx or failed at the network layer.
    FetchFailed {
        /// Request URL
        url: String,
        /// HTTP status, if a response arrived
        status: Option<u16>,
        /// Failure description
        message: String,
    },
}

impl RawEvent {
    /// The listener kind this event arrives through.
    #[must_use]
    pub const fn kind(&self) -> RawEventKind {
        match self {
            Self::KeyDown { .. } => RawEventKind::KeyDown,
            Self::Click { .. } => RawEventKind::Click,
            Self::Scroll { .. } => RawEventKind::Scroll,
            Self::MouseOver { .. } => RawEventKind::MouseOver,
            Self::MouseOut { .. } => RawEventKind::MouseOut,
            Self::MouseDown { .. } => RawEventKind::MouseDown,
            Self::MouseUp { .. } => RawEventKind::MouseUp,
            Self::FieldChange { .. } => RawEventKind::Change,
            Self::Submit { .. } => RawEventKind::Submit,
            Self::FormReset { .. } => RawEventKind::Reset,
            Self::FormInvalid { .. } => RawEventKind::Invalid,
            Self::FocusIn { .. } => RawEventKind::FocusIn,
            Self::FocusOut { .. } => RawEventKind::FocusOut,
            Self::Clipboard { op, .. } => match op {
                ClipboardOp::Cut => RawEventKind::Cut,
                ClipboardOp::Copy => RawEventKind::Copy,
                ClipboardOp::Paste => RawEventKind::Paste,
            },
            Self::SelectionChange { .. } => RawEventKind::SelectionChange,
            Self::HistoryNavigation { .. } => RawEventKind::PopState,
            Self::FetchFailed { .. } => RawEventKind::FetchFailed,
        }
    }

    /// Target element, for events that have one.
    #[must_use]
    pub const fn target(&self) -> Option<NodeId> {
        match self {
            Self::KeyDown { target, .. }
            | Self::Click { target }
            | Self::MouseOver { target }
            | Self::MouseOut { target }
            | Self::MouseDown { target, .. }
            | Self::MouseUp { target, .. }
            | Self::FieldChange { target, .. }
            | Self::Submit { target }
            | Self::FormReset { target }
            | Self::FormInvalid { target, .. }
            | Self::FocusIn { target }
            | Self::FocusOut { target }
            | Self::Clipboard { target, .. } => Some(*target),
            _ => None,
        }
    }
}

/// A synthesized platform event as dispatched by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    /// Platform event name (`pointerdown`, `keydown`, `input`, ...)
    pub name: String,
    /// Key name for keyboard events
    pub key: Option<String>,
    /// Whether this is a held-key repeat
    pub repeat: bool,
    /// Active modifier keys
    pub modifiers: Vec<String>,
    /// Viewport X for pointer events
    pub x: f32,
    /// Viewport Y for pointer events
    pub y: f32,
}

impl SyntheticEvent {
    /// A pointer or lifecycle event with no key data.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            repeat: false,
            modifiers: Vec::new(),
            x: 0.0,
            y: 0.0,
        }
    }

    /// A keyboard event.
    #[must_use]
    pub fn key(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Some(key.into()),
            repeat: false,
            modifiers: Vec::new(),
            x: 0.0,
            y: 0.0,
        }
    }

    /// Set pointer coordinates.
    #[must_use]
    pub const fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Mark as a held-key repeat.
    #[must_use]
    pub const fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Set active modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Vec<String>) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// What a structural observer should watch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObserveOptions {
    /// Watch child additions/removals
    pub child_list: bool,
    /// Watch attribute changes
    pub attributes: bool,
    /// Watch text-node changes
    pub character_data: bool,
    /// Watch the whole subtree
    pub subtree: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            child_list: true,
            attributes: true,
            character_data: false,
            subtree: true,
        }
    }
}

/// Handle for an active structural observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverHandle {
    /// Observed root
    pub root: NodeId,
    /// Host-assigned token
    pub token: u64,
}

/// Detachable handle for an attached raw-event listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerGuard {
    /// Listener kind
    pub kind: RawEventKind,
    /// Host-assigned token
    pub token: u64,
}

/// Registry of attached listeners, detached symmetrically on stop.
///
/// Replaces hand-mirrored attach/detach bookkeeping: every attach is
/// recorded here, and `detach_all` is the only way listeners come off.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    guards: Vec<ListenerGuard>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach listeners for every kind and record the guards.
    pub fn attach_all(&mut self, adapter: &dyn PageAdapter, kinds: &[RawEventKind]) {
        for kind in kinds {
            self.guards.push(adapter.listen(*kind));
        }
    }

    /// Detach every recorded listener.
    pub fn detach_all(&mut self, adapter: &dyn PageAdapter) {
        for guard in self.guards.drain(..) {
            adapter.unlisten(&guard);
        }
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no listeners are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Shared handle to a platform adapter.
pub type PageHandle = Arc<dyn PageAdapter>;

/// Everything the engine needs from the host platform.
///
/// Observation, geometry, and interaction methods are required; operations
/// the original delegates to the host shell (eval, tabs, screenshots,
/// navigation) have defaults that return a descriptive capability error so
/// a bare adapter degrades loudly but safely.
pub trait PageAdapter {
    // --- observation ---

    /// First element matching a selector.
    fn query(&self, selector: &str) -> Option<NodeId>;

    /// All elements matching a selector, in document order.
    fn query_all(&self, selector: &str) -> Vec<NodeId>;

    /// Whether an element matches a selector.
    fn matches(&self, node: NodeId, selector: &str) -> bool;

    /// Snapshot of an element, or `None` if it is gone.
    fn element(&self, node: NodeId) -> Option<ElementInfo>;

    /// Parent element, crossing shadow boundaries.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Child elements in document order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Document body root.
    fn document_root(&self) -> NodeId;

    /// Computed style subset for the visibility check.
    fn computed_style(&self, node: NodeId) -> ComputedStyle;

    /// Viewport rectangle.
    fn viewport(&self) -> Rect;

    /// Current scroll position `(x, y)`.
    fn scroll_position(&self) -> (f32, f32);

    /// Total scrollable document height.
    fn document_height(&self) -> f32;

    /// Topmost element at the viewport center.
    fn element_at_viewport_center(&self) -> Option<NodeId>;

    /// Shadow root hosted by an element, if any.
    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;

    /// Whether a node is itself a shadow root.
    fn is_shadow_root(&self, node: NodeId) -> bool;

    /// Whether a tag names a registered custom element.
    fn is_custom_element(&self, tag: &str) -> bool {
        tag.contains('-')
    }

    /// Whether a node sits inside the engine's own widget subtree.
    fn in_widget_subtree(&self, node: NodeId) -> bool;

    /// Current page URL.
    fn page_url(&self) -> String;

    /// Current page title.
    fn page_title(&self) -> String;

    /// Current selection text.
    fn selection_text(&self) -> String;

    /// Whether a global object with this name exists in the page.
    fn has_global(&self, _name: &str) -> bool {
        false
    }

    // --- listeners ---

    /// Attach a capture-phase listener for a raw-event kind.
    fn listen(&self, kind: RawEventKind) -> ListenerGuard;

    /// Detach a previously attached listener.
    fn unlisten(&self, guard: &ListenerGuard);

    /// Start a structural observer on a root.
    fn observe(&self, root: NodeId, opts: &ObserveOptions) -> ObserverHandle;

    /// Disconnect a structural observer.
    fn disconnect(&self, handle: &ObserverHandle);

    // --- interaction ---

    /// Dispatch a synthesized event on an element.
    fn dispatch(&self, node: NodeId, event: &SyntheticEvent);

    /// Focus an element.
    fn focus(&self, node: NodeId);

    /// Blur an element.
    fn blur(&self, node: NodeId);

    /// Currently focused element.
    fn active_element(&self) -> Option<NodeId>;

    /// Scroll an element into view.
    fn scroll_into_view(&self, node: NodeId);

    /// Set a form control's value through the native setter, bypassing
    /// framework value traps.
    fn set_native_value(&self, node: NodeId, value: &str);

    /// Insert text at the current selection inside a content-editable host.
    fn insert_text_at_selection(&self, node: NodeId, text: &str);

    /// Remove all text from a content-editable host.
    fn clear_text_content(&self, node: NodeId);

    /// Cooperative pause between dispatch steps so page listeners can react.
    fn pause(&self, ms: u64);

    // --- persisted storage (window identity) ---

    /// Read a value persisted for this browsing context.
    fn persisted_get(&self, key: &str) -> Option<String>;

    /// Persist a value for this browsing context.
    fn persisted_set(&self, key: &str, value: &str);

    // --- host-shell capabilities (default: unavailable) ---

    /// Evaluate arbitrary code in the page (escape hatch).
    fn eval(&self, _code: &str) -> VigiaResult<serde_json::Value> {
        Err(VigiaError::host_capability("eval"))
    }

    /// Navigate the page to a URL.
    fn navigate(&self, _url: &str) -> VigiaResult<()> {
        Err(VigiaError::host_capability("navigate"))
    }

    /// Reload the page.
    fn reload(&self) -> VigiaResult<()> {
        Err(VigiaError::host_capability("reload"))
    }

    /// Highlight an element on screen.
    fn highlight(&self, _node: NodeId) -> VigiaResult<()> {
        Err(VigiaError::host_capability("highlight"))
    }

    /// Open a tab (host shell).
    fn open_tab(&self, _url: &str) -> VigiaResult<String> {
        Err(VigiaError::host_capability("tabs.open"))
    }

    /// Close a tab (host shell).
    fn close_tab(&self, _tab: &str) -> VigiaResult<()> {
        Err(VigiaError::host_capability("tabs.close"))
    }

    /// Focus a tab (host shell).
    fn focus_tab(&self, _tab: &str) -> VigiaResult<()> {
        Err(VigiaError::host_capability("tabs.focus"))
    }

    /// Focus the OS window (host shell).
    fn focus_window(&self) -> VigiaResult<()> {
        Err(VigiaError::host_capability("window.focus"))
    }

    /// Metadata for a native screen capture (host shell).
    fn screenshot_metadata(&self) -> VigiaResult<serde_json::Value> {
        Err(VigiaError::host_capability("screenshot"))
    }
}
