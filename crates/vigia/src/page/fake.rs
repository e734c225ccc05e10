//! In-memory page for unit tests.
//!
//! Implements [`PageAdapter`] over a small element store with a simple
//! compound-selector matcher (`tag#id.class[attr="v"]`, comma lists, no
//! combinators). Dispatched synthetic events, attached listeners, and
//! active observers are all recorded so tests can assert on them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{
    ComputedStyle, ElementInfo, ListenerGuard, NodeId, ObserveOptions, ObserverHandle,
    PageAdapter, RawEventKind, Rect, SyntheticEvent,
};
use crate::result::{VigiaError, VigiaResult};

#[derive(Debug, Clone)]
struct FakeElement {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    input_type: Option<String>,
    value: Option<String>,
    content_editable: bool,
    bounds: Rect,
    style: ComputedStyle,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    is_shadow_root: bool,
    widget: bool,
}

impl FakeElement {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            id: None,
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            text: String::new(),
            input_type: None,
            value: None,
            content_editable: false,
            bounds: Rect::new(0.0, 0.0, 100.0, 20.0),
            style: ComputedStyle::default(),
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            is_shadow_root: false,
            widget: false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    elements: HashMap<NodeId, FakeElement>,
    order: Vec<NodeId>,
    next_id: u64,
    root: Option<NodeId>,
    dispatched: Vec<(NodeId, SyntheticEvent)>,
    active: Option<NodeId>,
    listeners: HashSet<(RawEventKind, u64)>,
    observers: HashSet<(NodeId, u64)>,
    next_token: u64,
    scroll: (f32, f32),
    viewport: Rect,
    document_height: f32,
    center_element: Option<NodeId>,
    url: String,
    title: String,
    selection: String,
    persisted: HashMap<String, String>,
    paused_ms: u64,
    custom_elements: HashSet<String>,
    globals: HashSet<String>,
}

/// In-memory [`PageAdapter`] implementation.
#[derive(Debug)]
pub struct FakePage {
    inner: Mutex<Inner>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    /// Create a page with an empty `body` root.
    #[must_use]
    pub fn new() -> Self {
        let page = Self {
            inner: Mutex::new(Inner {
                viewport: Rect::new(0.0, 0.0, 1280.0, 720.0),
                document_height: 2000.0,
                url: "https://example.test/".to_string(),
                title: "Example".to_string(),
                ..Inner::default()
            }),
        };
        let root = page.insert(None, "body");
        page.inner.lock().unwrap().root = Some(root);
        page
    }

    /// Shared handle.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn insert(&self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = NodeId(inner.next_id);
        let mut el = FakeElement::new(tag);
        el.parent = parent;
        inner.elements.insert(id, el);
        inner.order.push(id);
        if let Some(p) = parent {
            if let Some(parent_el) = inner.elements.get_mut(&p) {
                parent_el.children.push(id);
            }
        }
        id
    }

    /// Add an element under a parent (or under the body root).
    pub fn add_element(&self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let parent = parent.or_else(|| self.inner.lock().unwrap().root);
        self.insert(parent, tag)
    }

    /// Remove an element and its subtree; returns its last snapshot.
    pub fn remove_element(&self, node: NodeId) -> Option<ElementInfo> {
        let info = self.element(node);
        let mut inner = self.inner.lock().unwrap();
        let parent = inner.elements.get(&node).and_then(|e| e.parent);
        if let Some(p) = parent {
            if let Some(parent_el) = inner.elements.get_mut(&p) {
                parent_el.children.retain(|c| *c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(el) = inner.elements.remove(&n) {
                stack.extend(el.children);
                if let Some(sr) = el.shadow_root {
                    stack.push(sr);
                }
            }
            inner.order.retain(|o| *o != n);
        }
        info
    }

    fn with_element<R>(&self, node: NodeId, f: impl FnOnce(&mut FakeElement) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.elements.get_mut(&node).map(f)
    }

    /// Set the `id` attribute.
    pub fn set_id(&self, node: NodeId, id: &str) {
        self.with_element(node, |el| el.id = Some(id.to_string()));
    }

    /// Append a class token.
    pub fn add_class(&self, node: NodeId, class: &str) {
        self.with_element(node, |el| el.classes.push(class.to_string()));
    }

    /// Replace the class list.
    pub fn set_classes(&self, node: NodeId, classes: &[&str]) {
        self.with_element(node, |el| {
            el.classes = classes.iter().map(|c| (*c).to_string()).collect();
        });
    }

    /// Set an attribute.
    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        self.with_element(node, |el| {
            el.attributes.insert(name.to_string(), value.to_string());
        });
    }

    /// Remove an attribute.
    pub fn remove_attr(&self, node: NodeId, name: &str) {
        self.with_element(node, |el| {
            el.attributes.remove(name);
        });
    }

    /// Set visible text.
    pub fn set_text(&self, node: NodeId, text: &str) {
        self.with_element(node, |el| el.text = text.to_string());
    }

    /// Set an input's `type`.
    pub fn set_input_type(&self, node: NodeId, ty: &str) {
        self.with_element(node, |el| el.input_type = Some(ty.to_string()));
    }

    /// Set a control's value.
    pub fn set_value(&self, node: NodeId, value: &str) {
        self.with_element(node, |el| el.value = Some(value.to_string()));
    }

    /// Mark content-editable.
    pub fn set_editable(&self, node: NodeId, editable: bool) {
        self.with_element(node, |el| el.content_editable = editable);
    }

    /// Set the bounding box.
    pub fn set_bounds(&self, node: NodeId, bounds: Rect) {
        self.with_element(node, |el| el.bounds = bounds);
    }

    /// Override computed style.
    pub fn set_style(&self, node: NodeId, style: ComputedStyle) {
        self.with_element(node, |el| el.style = style);
    }

    /// Set a single display value.
    pub fn set_display(&self, node: NodeId, display: &str) {
        self.with_element(node, |el| el.style.display = display.to_string());
    }

    /// Mark a node as part of the engine's own widget subtree.
    pub fn mark_widget(&self, node: NodeId) {
        self.with_element(node, |el| el.widget = true);
    }

    /// Attach a shadow root to a host element.
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let root = self.insert(Some(host), tag_for_shadow());
        self.with_element(root, |el| el.is_shadow_root = true);
        self.with_element(host, |el| el.shadow_root = Some(root));
        // The shadow root is not a light-DOM child.
        self.with_element(host, |el| el.children.retain(|c| *c != root));
        root
    }

    /// Register a custom-element tag.
    pub fn define_custom_element(&self, tag: &str) {
        self.inner
            .lock()
            .unwrap()
            .custom_elements
            .insert(tag.to_lowercase());
    }

    /// Events dispatched through the adapter, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<(NodeId, SyntheticEvent)> {
        self.inner.lock().unwrap().dispatched.clone()
    }

    /// Names of dispatched events, in order.
    #[must_use]
    pub fn dispatched_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .dispatched
            .iter()
            .map(|(_, e)| e.name.clone())
            .collect()
    }

    /// Clear the dispatched-event log.
    pub fn clear_dispatched(&self) {
        self.inner.lock().unwrap().dispatched.clear();
    }

    /// Kinds with at least one attached listener.
    #[must_use]
    pub fn listener_kinds(&self) -> Vec<RawEventKind> {
        let inner = self.inner.lock().unwrap();
        let mut kinds: Vec<_> = inner.listeners.iter().map(|(k, _)| *k).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Total attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }

    /// Active observer roots.
    #[must_use]
    pub fn observer_roots(&self) -> Vec<NodeId> {
        let inner = self.inner.lock().unwrap();
        let mut roots: Vec<_> = inner.observers.iter().map(|(r, _)| *r).collect();
        roots.sort();
        roots
    }

    /// Set the scroll position.
    pub fn set_scroll(&self, x: f32, y: f32) {
        self.inner.lock().unwrap().scroll = (x, y);
    }

    /// Set the element reported at viewport center.
    pub fn set_center_element(&self, node: Option<NodeId>) {
        self.inner.lock().unwrap().center_element = node;
    }

    /// Set the page URL.
    pub fn set_url(&self, url: &str) {
        self.inner.lock().unwrap().url = url.to_string();
    }

    /// Set the page title.
    pub fn set_title(&self, title: &str) {
        self.inner.lock().unwrap().title = title.to_string();
    }

    /// Set the current selection text.
    pub fn set_selection(&self, text: &str) {
        self.inner.lock().unwrap().selection = text.to_string();
    }

    /// Expose a global object name to the framework probe.
    pub fn define_global(&self, name: &str) {
        self.inner.lock().unwrap().globals.insert(name.to_string());
    }

    /// Total cooperative pause time requested by the simulator.
    #[must_use]
    pub fn paused_ms(&self) -> u64 {
        self.inner.lock().unwrap().paused_ms
    }

    fn matches_compound(el: &FakeElement, part: &str) -> bool {
        let mut rest = part.trim();
        if rest.is_empty() || rest == "*" {
            return true;
        }
        // Leading tag name
        let tag_end = rest
            .find(|c| c == '#' || c == '.' || c == '[')
            .unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if !tag.is_empty() && el.tag != tag.to_lowercase() {
            return false;
        }
        rest = &rest[tag_end..];
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix('#') {
                let end = stripped
                    .find(|c| c == '#' || c == '.' || c == '[')
                    .unwrap_or(stripped.len());
                if el.id.as_deref() != Some(&stripped[..end]) {
                    return false;
                }
                rest = &stripped[end..];
            } else if let Some(stripped) = rest.strip_prefix('.') {
                let end = stripped
                    .find(|c| c == '#' || c == '.' || c == '[')
                    .unwrap_or(stripped.len());
                let class = &stripped[..end];
                if !el.classes.iter().any(|c| c == class) {
                    return false;
                }
                rest = &stripped[end..];
            } else if let Some(stripped) = rest.strip_prefix('[') {
                let Some(end) = stripped.find(']') else {
                    return false;
                };
                let body = &stripped[..end];
                let ok = if let Some((name, value)) = body.split_once('=') {
                    let value = value.trim_matches('"').trim_matches('\'');
                    match name {
                        "id" => el.id.as_deref() == Some(value),
                        "class" => el.classes.iter().any(|c| c == value),
                        _ => el.attributes.get(name).map(String::as_str) == Some(value),
                    }
                } else {
                    match body {
                        "id" => el.id.is_some(),
                        _ => el.attributes.contains_key(body),
                    }
                };
                if !ok {
                    return false;
                }
                rest = &stripped[end + 1..];
            } else {
                return false;
            }
        }
        true
    }

    fn matches_selector(el: &FakeElement, selector: &str) -> bool {
        selector
            .split(',')
            .any(|part| Self::matches_compound(el, part))
    }
}

const fn tag_for_shadow() -> &'static str {
    "#shadow-root"
}

impl PageAdapter for FakePage {
    fn query(&self, selector: &str) -> Option<NodeId> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .find(|id| {
                inner
                    .elements
                    .get(id)
                    .is_some_and(|el| Self::matches_selector(el, selector))
            })
            .copied()
    }

    fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .elements
                    .get(id)
                    .is_some_and(|el| Self::matches_selector(el, selector))
            })
            .copied()
            .collect()
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .elements
            .get(&node)
            .is_some_and(|el| Self::matches_selector(el, selector))
    }

    fn element(&self, node: NodeId) -> Option<ElementInfo> {
        let inner = self.inner.lock().unwrap();
        inner.elements.get(&node).map(|el| ElementInfo {
            tag: el.tag.clone(),
            id: el.id.clone(),
            classes: el.classes.clone(),
            attributes: el.attributes.clone(),
            text: el.text.clone(),
            input_type: el.input_type.clone(),
            value: el.value.clone(),
            content_editable: el.content_editable,
            bounds: el.bounds,
        })
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .elements
            .get(&node)
            .and_then(|el| el.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .elements
            .get(&node)
            .map(|el| el.children.clone())
            .unwrap_or_default()
    }

    fn document_root(&self) -> NodeId {
        self.inner.lock().unwrap().root.unwrap_or(NodeId(0))
    }

    fn computed_style(&self, node: NodeId) -> ComputedStyle {
        self.inner
            .lock()
            .unwrap()
            .elements
            .get(&node)
            .map(|el| el.style.clone())
            .unwrap_or_default()
    }

    fn viewport(&self) -> Rect {
        self.inner.lock().unwrap().viewport
    }

    fn scroll_position(&self) -> (f32, f32) {
        self.inner.lock().unwrap().scroll
    }

    fn document_height(&self) -> f32 {
        self.inner.lock().unwrap().document_height
    }

    fn element_at_viewport_center(&self) -> Option<NodeId> {
        self.inner.lock().unwrap().center_element
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .elements
            .get(&node)
            .and_then(|el| el.shadow_root)
    }

    fn is_shadow_root(&self, node: NodeId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .elements
            .get(&node)
            .is_some_and(|el| el.is_shadow_root)
    }

    fn is_custom_element(&self, tag: &str) -> bool {
        self.inner.lock().unwrap().custom_elements.contains(tag)
    }

    fn in_widget_subtree(&self, node: NodeId) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut current = Some(node);
        while let Some(n) = current {
            match inner.elements.get(&n) {
                Some(el) if el.widget => return true,
                Some(el) => current = el.parent,
                None => return false,
            }
        }
        false
    }

    fn page_url(&self) -> String {
        self.inner.lock().unwrap().url.clone()
    }

    fn page_title(&self) -> String {
        self.inner.lock().unwrap().title.clone()
    }

    fn selection_text(&self) -> String {
        self.inner.lock().unwrap().selection.clone()
    }

    fn has_global(&self, name: &str) -> bool {
        self.inner.lock().unwrap().globals.contains(name)
    }

    fn listen(&self, kind: RawEventKind) -> ListenerGuard {
        let mut inner = self.inner.lock().unwrap();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.listeners.insert((kind, token));
        ListenerGuard { kind, token }
    }

    fn unlisten(&self, guard: &ListenerGuard) {
        self.inner
            .lock()
            .unwrap()
            .listeners
            .remove(&(guard.kind, guard.token));
    }

    fn observe(&self, root: NodeId, _opts: &ObserveOptions) -> ObserverHandle {
        let mut inner = self.inner.lock().unwrap();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.observers.insert((root, token));
        ObserverHandle { root, token }
    }

    fn disconnect(&self, handle: &ObserverHandle) {
        self.inner
            .lock()
            .unwrap()
            .observers
            .remove(&(handle.root, handle.token));
    }

    fn dispatch(&self, node: NodeId, event: &SyntheticEvent) {
        self.inner
            .lock()
            .unwrap()
            .dispatched
            .push((node, event.clone()));
    }

    fn focus(&self, node: NodeId) {
        self.inner.lock().unwrap().active = Some(node);
    }

    fn blur(&self, node: NodeId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active == Some(node) {
            inner.active = None;
        }
    }

    fn active_element(&self) -> Option<NodeId> {
        self.inner.lock().unwrap().active
    }

    fn scroll_into_view(&self, _node: NodeId) {}

    fn set_native_value(&self, node: NodeId, value: &str) {
        self.with_element(node, |el| el.value = Some(value.to_string()));
    }

    fn insert_text_at_selection(&self, node: NodeId, text: &str) {
        self.with_element(node, |el| el.text.push_str(text));
    }

    fn clear_text_content(&self, node: NodeId) {
        self.with_element(node, |el| el.text.clear());
    }

    fn pause(&self, ms: u64) {
        self.inner.lock().unwrap().paused_ms += ms;
    }

    fn persisted_get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().persisted.get(key).cloned()
    }

    fn persisted_set(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .persisted
            .insert(key.to_string(), value.to_string());
    }

    fn navigate(&self, url: &str) -> VigiaResult<()> {
        self.set_url(url);
        Ok(())
    }

    fn reload(&self) -> VigiaResult<()> {
        Ok(())
    }

    fn highlight(&self, node: NodeId) -> VigiaResult<()> {
        if self.element(node).is_some() {
            Ok(())
        } else {
            Err(VigiaError::not_found(format!("node {}", node.0)))
        }
    }

    fn eval(&self, code: &str) -> VigiaResult<serde_json::Value> {
        // The fake understands one expression, enough to exercise the channel.
        if code == "1 + 1" {
            Ok(serde_json::json!(2))
        } else {
            Err(VigiaError::host_capability("eval"))
        }
    }
}
