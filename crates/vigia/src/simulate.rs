//! Synthetic interaction simulator.
//!
//! Drives click, type, and key-combination sequences against live page
//! elements, reproducing the platform event order a real user would
//! generate so page scripts cannot tell the difference. Typing supports a
//! humanlike mode with per-character delay jitter, occasional longer
//! pauses, and typo injection from a fixed keyboard-adjacency table.
//!
//! Randomness is a deterministic xorshift64 stream so a seeded run
//! reproduces the exact same event sequence.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::descriptor;
use crate::page::{NodeId, PageHandle, SyntheticEvent};
use crate::result::{VigiaError, VigiaResult};

/// Opacity below which an element is considered invisible.
pub const OPACITY_THRESHOLD: f32 = 0.05;
/// Cooperative pause between pointer-sequence steps.
pub const STEP_PAUSE_MS: u64 = 15;
/// Pause inserted after a typo before the correction.
pub const TYPO_PAUSE_MS: u64 = 250;

const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic xorshift64 stream for cadence jitter and typo placement.
#[derive(Debug, Clone)]
struct Jitter {
    state: u64,
}

impl Jitter {
    const fn new(seed: u64) -> Self {
        // xorshift64 has a fixed point at zero
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn next_f32(&mut self) -> f32 {
        ((self.next_u64() >> 11) as f64 / (1u64 << 53) as f64) as f32
    }

    /// Uniform value in `[lo, hi]`.
    fn range(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_u64() % (hi - lo + 1)
    }

    fn chance(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    fn pick(&mut self, len: usize) -> usize {
        (self.next_u64() % len as u64) as usize
    }
}

/// QWERTY rows used to pick a plausible wrong key for typo injection.
const KEYBOARD_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// A physically adjacent key for `c`, or `None` for keys off the letter rows.
fn adjacent_key(c: char, jitter: &mut Jitter) -> Option<char> {
    let lower = c.to_ascii_lowercase();
    let (row, col) = KEYBOARD_ROWS.iter().enumerate().find_map(|(r, keys)| {
        keys.chars().position(|k| k == lower).map(|col| (r, col))
    })?;
    let mut neighbors = Vec::new();
    let row_keys: Vec<char> = KEYBOARD_ROWS[row].chars().collect();
    if col > 0 {
        neighbors.push(row_keys[col - 1]);
    }
    if col + 1 < row_keys.len() {
        neighbors.push(row_keys[col + 1]);
    }
    for r in [row.checked_sub(1), Some(row + 1)].into_iter().flatten() {
        if let Some(keys) = KEYBOARD_ROWS.get(r) {
            let keys: Vec<char> = keys.chars().collect();
            if let Some(&k) = keys.get(col) {
                neighbors.push(k);
            }
        }
    }
    if neighbors.is_empty() {
        return None;
    }
    let pick = neighbors[jitter.pick(neighbors.len())];
    Some(if c.is_ascii_uppercase() {
        pick.to_ascii_uppercase()
    } else {
        pick
    })
}

/// How typing acquires focus before the first keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    /// Leave focus untouched
    None,
    /// Abbreviated pointer sequence, then focus
    Mouse,
    /// Tab keystroke, then focus
    Keyboard,
    /// Programmatic focus only
    #[default]
    Direct,
}

/// Options for a type operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeOptions {
    /// Apply humanlike cadence and typo injection
    pub humanlike: bool,
    /// Minimum per-character delay in humanlike mode
    pub min_delay_ms: u64,
    /// Maximum per-character delay in humanlike mode
    pub max_delay_ms: u64,
    /// Probability of a longer thinking pause per character
    pub long_pause_chance: f32,
    /// Length of the longer pause
    pub long_pause_ms: u64,
    /// Probability of a typo per character (value-setter path only)
    pub typo_rate: f32,
    /// Focus acquisition mode
    pub focus: FocusMode,
    /// Clear the field before typing
    pub clear_first: bool,
    /// Blur the field after typing
    pub blur_after: bool,
    /// Override the simulator's jitter seed for this operation
    pub seed: Option<u64>,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            humanlike: false,
            min_delay_ms: 30,
            max_delay_ms: 120,
            long_pause_chance: 0.04,
            long_pause_ms: 350,
            typo_rate: 0.03,
            focus: FocusMode::Direct,
            clear_first: false,
            blur_after: false,
            seed: None,
        }
    }
}

/// Where typed characters land.
enum MutationPath {
    /// Native value setter on inputs/textareas, bypassing framework traps
    NativeValue(String),
    /// Selection-based insertion for content-editable hosts
    Selection,
}

/// The synthetic interaction simulator.
pub struct Simulator {
    page: PageHandle,
    jitter: Jitter,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator").finish_non_exhaustive()
    }
}

impl Simulator {
    /// Create a simulator with the default jitter seed.
    #[must_use]
    pub fn new(page: PageHandle) -> Self {
        Self::with_seed(page, DEFAULT_SEED)
    }

    /// Create a simulator with an explicit jitter seed.
    #[must_use]
    pub fn with_seed(page: PageHandle, seed: u64) -> Self {
        Self {
            page,
            jitter: Jitter::new(seed),
        }
    }

    /// Click an element after a full visibility check.
    ///
    /// Dispatches the realistic pointer sequence (enter, over, move, down,
    /// focus, up, click) with short cooperative pauses between steps.
    pub fn click(&mut self, selector: &str) -> VigiaResult<Value> {
        let node = self.locate(selector)?;
        self.page.scroll_into_view(node);
        self.check_visible(node)?;

        let bounds = self
            .page
            .element(node)
            .ok_or_else(|| VigiaError::not_found(selector))?
            .bounds;
        let x = bounds.x + bounds.width / 2.0;
        let y = bounds.y + bounds.height / 2.0;

        for name in ["pointerenter", "pointerover", "pointermove", "pointerdown"] {
            self.page.dispatch(node, &SyntheticEvent::named(name).at(x, y));
            self.page.pause(STEP_PAUSE_MS);
        }
        self.page.focus(node);
        for name in ["pointerup", "click"] {
            self.page.dispatch(node, &SyntheticEvent::named(name).at(x, y));
            self.page.pause(STEP_PAUSE_MS);
        }

        let target = descriptor::resolve(self.page.as_ref(), node).description;
        debug!(%target, "click dispatched");
        Ok(json!({ "clicked": target }))
    }

    /// Type text into an input, textarea, or content-editable element.
    pub fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        opts: &TypeOptions,
    ) -> VigiaResult<Value> {
        let node = self.locate(selector)?;
        self.page.scroll_into_view(node);
        let info = self
            .page
            .element(node)
            .ok_or_else(|| VigiaError::not_found(selector))?;
        if !info.accepts_typing() {
            return Err(VigiaError::InputError {
                message: format!("element <{}> does not accept text input", info.tag),
            });
        }

        let mut jitter = opts
            .seed
            .map_or_else(|| self.jitter.clone(), Jitter::new);
        self.acquire_focus(node, opts.focus, &mut jitter);

        let mut path = if info.content_editable {
            MutationPath::Selection
        } else {
            MutationPath::NativeValue(if opts.clear_first {
                String::new()
            } else {
                info.value.clone().unwrap_or_default()
            })
        };
        if opts.clear_first {
            match &path {
                MutationPath::NativeValue(current) => self.page.set_native_value(node, current),
                MutationPath::Selection => self.page.clear_text_content(node),
            }
            self.page.dispatch(node, &SyntheticEvent::named("input"));
        }

        let mut typos = 0u32;
        for c in text.chars() {
            if opts.humanlike && opts.typo_rate > 0.0 && jitter.chance(opts.typo_rate) {
                // Correction needs the value-setter path; content-editable
                // insertion is append-only.
                if matches!(path, MutationPath::NativeValue(_)) {
                    if let Some(wrong) = adjacent_key(c, &mut jitter) {
                        self.key_char(node, wrong, &mut path);
                        self.page.pause(TYPO_PAUSE_MS);
                        self.backspace(node, &mut path);
                        typos += 1;
                    }
                }
            }
            self.key_char(node, c, &mut path);
            if opts.humanlike {
                let mut delay = jitter.range(opts.min_delay_ms, opts.max_delay_ms);
                if jitter.chance(opts.long_pause_chance) {
                    delay += opts.long_pause_ms;
                }
                self.page.pause(delay);
            }
        }
        // Keep the stream position consistent across unseeded calls.
        if opts.seed.is_none() {
            self.jitter = jitter;
        }

        if opts.blur_after {
            self.page.blur(node);
        }
        let target = descriptor::resolve(self.page.as_ref(), node).description;
        debug!(%target, chars = text.chars().count(), typos, "typing complete");
        Ok(json!({
            "target": target,
            "typed": text.chars().count(),
            "typos": typos,
        }))
    }

    /// Press a key combination such as `Control+Shift+K`.
    ///
    /// Modifier press order is randomized; releases mirror the press order
    /// in reverse. `repeat` > 1 re-dispatches the main key-down with the
    /// held-key repeat flag set.
    pub fn press_key(&mut self, combo: &str, repeat: u32) -> VigiaResult<Value> {
        let mut parts: Vec<&str> = combo.split('+').map(str::trim).collect();
        let key = parts
            .pop()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VigiaError::InputError {
                message: format!("unparseable key combination: {combo:?}"),
            })?;
        let mut modifiers: Vec<String> = parts.iter().map(|m| (*m).to_string()).collect();
        if modifiers.iter().any(String::is_empty) {
            return Err(VigiaError::InputError {
                message: format!("unparseable key combination: {combo:?}"),
            });
        }

        // Fisher-Yates on the press order.
        for i in (1..modifiers.len()).rev() {
            modifiers.swap(i, self.jitter.pick(i + 1));
        }

        let node = self
            .page
            .active_element()
            .unwrap_or_else(|| self.page.document_root());

        let mut held: Vec<String> = Vec::new();
        for modifier in &modifiers {
            held.push(modifier.clone());
            self.page.dispatch(
                node,
                &SyntheticEvent::key("keydown", modifier.clone()).with_modifiers(held.clone()),
            );
            self.page.pause(self.jitter.range(5, 25));
        }
        for n in 0..repeat.max(1) {
            self.page.dispatch(
                node,
                &SyntheticEvent::key("keydown", key)
                    .with_modifiers(held.clone())
                    .with_repeat(n > 0),
            );
            self.page.pause(self.jitter.range(5, 25));
        }
        self.page.dispatch(
            node,
            &SyntheticEvent::key("keyup", key).with_modifiers(held.clone()),
        );
        for modifier in modifiers.iter().rev() {
            self.page.dispatch(
                node,
                &SyntheticEvent::key("keyup", modifier.clone()).with_modifiers(held.clone()),
            );
            held.pop();
            self.page.pause(self.jitter.range(5, 25));
        }

        trace!(combo, repeat, "key combination dispatched");
        Ok(json!({ "pressed": combo, "repeat": repeat.max(1) }))
    }

    /// Dispatch an arbitrary named event on a matching element.
    pub fn dispatch_named(&self, selector: &str, name: &str) -> VigiaResult<Value> {
        let node = self.locate(selector)?;
        self.page.dispatch(node, &SyntheticEvent::named(name));
        Ok(json!({ "dispatched": name }))
    }

    /// Multi-reason visibility check; the error message names the first
    /// failing reason.
    pub fn check_visible(&self, node: NodeId) -> VigiaResult<()> {
        let info = self
            .page
            .element(node)
            .ok_or_else(|| VigiaError::not_visible("element detached from the document"))?;

        // Ancestor-carried reasons first.
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if let Some(i) = self.page.element(n) {
                if i.attributes.contains_key("hidden") {
                    return Err(VigiaError::not_visible("hidden attribute"));
                }
                if i.attr("aria-hidden") == Some("true") {
                    return Err(VigiaError::not_visible("aria-hidden"));
                }
                if n != node && i.tag == "details" && !i.attributes.contains_key("open") {
                    return Err(VigiaError::not_visible("inside a collapsed <details>"));
                }
            }
            cursor = self.page.parent(n);
        }

        let style = self.page.computed_style(node);
        if style.display == "none" {
            return Err(VigiaError::not_visible("display: none"));
        }
        if style.visibility == "hidden" || style.visibility == "collapse" {
            return Err(VigiaError::not_visible(format!(
                "visibility: {}",
                style.visibility
            )));
        }
        if style.opacity < OPACITY_THRESHOLD {
            return Err(VigiaError::not_visible(format!(
                "opacity {} below threshold",
                style.opacity
            )));
        }
        if info.bounds.is_empty() {
            return Err(VigiaError::not_visible("zero size"));
        }
        if !info.bounds.intersects(&self.page.viewport()) {
            return Err(VigiaError::not_visible("outside the viewport"));
        }
        if style.pointer_events == "none" {
            return Err(VigiaError::not_visible("pointer-events: none"));
        }
        if is_degenerate_clip(&style.clip_path) {
            return Err(VigiaError::not_visible(format!(
                "degenerate clip-path: {}",
                style.clip_path
            )));
        }
        Ok(())
    }

    fn locate(&self, selector: &str) -> VigiaResult<NodeId> {
        self.page
            .query(selector)
            .ok_or_else(|| VigiaError::not_found(selector))
    }

    fn acquire_focus(&mut self, node: NodeId, mode: FocusMode, jitter: &mut Jitter) {
        match mode {
            FocusMode::None => {}
            FocusMode::Direct => self.page.focus(node),
            FocusMode::Mouse => {
                for name in ["pointerdown", "pointerup", "click"] {
                    self.page.dispatch(node, &SyntheticEvent::named(name));
                    self.page.pause(jitter.range(5, 25));
                }
                self.page.focus(node);
            }
            FocusMode::Keyboard => {
                let from = self
                    .page
                    .active_element()
                    .unwrap_or_else(|| self.page.document_root());
                self.page.dispatch(from, &SyntheticEvent::key("keydown", "Tab"));
                self.page.dispatch(from, &SyntheticEvent::key("keyup", "Tab"));
                self.page.focus(node);
            }
        }
    }

    /// Full per-character sequence: keydown, beforeinput, mutation, input,
    /// keyup.
    fn key_char(&self, node: NodeId, c: char, path: &mut MutationPath) {
        let key = c.to_string();
        self.page
            .dispatch(node, &SyntheticEvent::key("keydown", key.clone()));
        self.page
            .dispatch(node, &SyntheticEvent::key("beforeinput", key.clone()));
        match path {
            MutationPath::NativeValue(current) => {
                current.push(c);
                self.page.set_native_value(node, current);
            }
            MutationPath::Selection => {
                self.page.insert_text_at_selection(node, &key);
            }
        }
        self.page.dispatch(node, &SyntheticEvent::named("input"));
        self.page.dispatch(node, &SyntheticEvent::key("keyup", key));
    }

    fn backspace(&self, node: NodeId, path: &mut MutationPath) {
        self.page
            .dispatch(node, &SyntheticEvent::key("keydown", "Backspace"));
        if let MutationPath::NativeValue(current) = path {
            current.pop();
            self.page.set_native_value(node, current);
        }
        self.page.dispatch(node, &SyntheticEvent::named("input"));
        self.page
            .dispatch(node, &SyntheticEvent::key("keyup", "Backspace"));
    }
}

/// Clip paths that collapse the element to nothing.
fn is_degenerate_clip(clip_path: &str) -> bool {
    let c = clip_path.replace(' ', "");
    c.contains("inset(50%")
        || c.contains("inset(100%")
        || c.contains("circle(0")
        || c.contains("polygon(0px0px,0px0px")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::FakePage;
    use crate::page::{ComputedStyle, PageAdapter, Rect};
    use std::sync::Arc;

    fn page_with_button() -> (Arc<FakePage>, NodeId) {
        let page = FakePage::shared();
        let node = page.add_element(None, "button");
        page.set_id(node, "go");
        page.set_bounds(node, Rect::new(10.0, 10.0, 80.0, 24.0));
        (page, node)
    }

    fn page_with_input() -> (Arc<FakePage>, NodeId) {
        let page = FakePage::shared();
        let node = page.add_element(None, "input");
        page.set_id(node, "name");
        page.set_input_type(node, "text");
        page.set_bounds(node, Rect::new(10.0, 10.0, 120.0, 24.0));
        (page, node)
    }

    mod click_tests {
        use super::*;

        #[test]
        fn click_dispatches_full_pointer_sequence() {
            let (page, node) = page_with_button();
            let mut sim = Simulator::new(page.clone());
            sim.click("#go").unwrap();
            assert_eq!(
                page.dispatched_names(),
                vec![
                    "pointerenter",
                    "pointerover",
                    "pointermove",
                    "pointerdown",
                    "pointerup",
                    "click"
                ]
            );
            assert_eq!(page.active_element(), Some(node));
            assert!(page.paused_ms() > 0, "cooperative pauses between steps");
        }

        #[test]
        fn click_reports_display_none_then_succeeds_when_shown() {
            let (page, node) = page_with_button();
            page.set_display(node, "none");
            let mut sim = Simulator::new(page.clone());
            let err = sim.click("#go").unwrap_err();
            assert!(err.to_string().contains("display: none"), "{err}");

            page.set_display(node, "block");
            assert!(sim.click("#go").is_ok());
        }

        #[test]
        fn click_on_missing_selector_is_not_found() {
            let page = FakePage::shared();
            let mut sim = Simulator::new(page);
            assert!(matches!(
                sim.click("#nope"),
                Err(VigiaError::NotFound { .. })
            ));
        }
    }

    mod visibility_tests {
        use super::*;

        fn reason(page: &Arc<FakePage>, node: NodeId) -> String {
            Simulator::new(page.clone())
                .check_visible(node)
                .unwrap_err()
                .to_string()
        }

        #[test]
        fn each_failure_names_its_reason() {
            let (page, node) = page_with_button();

            page.set_attr(node, "hidden", "");
            assert!(reason(&page, node).contains("hidden attribute"));
            page.remove_attr(node, "hidden");

            page.set_attr(node, "aria-hidden", "true");
            assert!(reason(&page, node).contains("aria-hidden"));
            page.remove_attr(node, "aria-hidden");

            page.set_bounds(node, Rect::new(10.0, 10.0, 0.0, 0.0));
            assert!(reason(&page, node).contains("zero size"));

            page.set_bounds(node, Rect::new(-500.0, -500.0, 80.0, 24.0));
            assert!(reason(&page, node).contains("outside the viewport"));
            page.set_bounds(node, Rect::new(10.0, 10.0, 80.0, 24.0));

            page.set_style(
                node,
                ComputedStyle {
                    pointer_events: "none".to_string(),
                    ..ComputedStyle::default()
                },
            );
            assert!(reason(&page, node).contains("pointer-events: none"));

            page.set_style(
                node,
                ComputedStyle {
                    opacity: 0.01,
                    ..ComputedStyle::default()
                },
            );
            assert!(reason(&page, node).contains("opacity"));

            page.set_style(
                node,
                ComputedStyle {
                    clip_path: "inset(100%)".to_string(),
                    ..ComputedStyle::default()
                },
            );
            assert!(reason(&page, node).contains("clip-path"));
        }

        #[test]
        fn collapsed_details_ancestor_blocks_click() {
            let page = FakePage::shared();
            let details = page.add_element(None, "details");
            page.set_bounds(details, Rect::new(0.0, 0.0, 200.0, 20.0));
            let button = page.add_element(Some(details), "button");
            page.set_bounds(button, Rect::new(0.0, 0.0, 80.0, 20.0));
            assert!(reason(&page, button).contains("collapsed <details>"));

            page.set_attr(details, "open", "");
            assert!(Simulator::new(page.clone()).check_visible(button).is_ok());
        }
    }

    mod type_tests {
        use super::*;

        #[test]
        fn typing_sets_value_through_native_setter() {
            let (page, node) = page_with_input();
            let mut sim = Simulator::new(page.clone());
            sim.type_text("#name", "hi!", &TypeOptions::default()).unwrap();

            let info = page.element(node).unwrap();
            assert_eq!(info.value.as_deref(), Some("hi!"));
            assert_eq!(page.active_element(), Some(node));
            let names = page.dispatched_names();
            assert_eq!(names.iter().filter(|n| *n == "keydown").count(), 3);
            assert_eq!(names.iter().filter(|n| *n == "beforeinput").count(), 3);
            assert_eq!(names.iter().filter(|n| *n == "input").count(), 3);
            assert_eq!(names.iter().filter(|n| *n == "keyup").count(), 3);
        }

        #[test]
        fn content_editable_uses_selection_insertion() {
            let page = FakePage::shared();
            let node = page.add_element(None, "div");
            page.set_id(node, "editor");
            page.set_editable(node, true);
            page.set_bounds(node, Rect::new(0.0, 0.0, 300.0, 100.0));

            let mut sim = Simulator::new(page.clone());
            sim.type_text("#editor", "ab", &TypeOptions::default()).unwrap();
            let info = page.element(node).unwrap();
            assert_eq!(info.text, "ab");
            assert!(info.value.is_none(), "no native value written");
        }

        #[test]
        fn clear_first_replaces_existing_value() {
            let (page, node) = page_with_input();
            page.set_value(node, "old");
            let mut sim = Simulator::new(page.clone());
            sim.type_text(
                "#name",
                "new",
                &TypeOptions {
                    clear_first: true,
                    ..TypeOptions::default()
                },
            )
            .unwrap();
            assert_eq!(page.element(node).unwrap().value.as_deref(), Some("new"));
        }

        #[test]
        fn clear_first_empties_content_editable_hosts() {
            let page = FakePage::shared();
            let node = page.add_element(None, "div");
            page.set_id(node, "editor");
            page.set_editable(node, true);
            page.set_text(node, "draft");
            page.set_bounds(node, Rect::new(0.0, 0.0, 300.0, 100.0));

            let mut sim = Simulator::new(page.clone());
            sim.type_text(
                "#editor",
                "ab",
                &TypeOptions {
                    clear_first: true,
                    ..TypeOptions::default()
                },
            )
            .unwrap();
            assert_eq!(page.element(node).unwrap().text, "ab");
        }

        #[test]
        fn toggles_reject_typing() {
            let page = FakePage::shared();
            let node = page.add_element(None, "input");
            page.set_id(node, "agree");
            page.set_input_type(node, "checkbox");
            let mut sim = Simulator::new(page);
            assert!(matches!(
                sim.type_text("#agree", "x", &TypeOptions::default()),
                Err(VigiaError::InputError { .. })
            ));
        }

        #[test]
        fn typos_are_corrected_before_continuing() {
            let (page, node) = page_with_input();
            let mut sim = Simulator::new(page.clone());
            sim.type_text(
                "#name",
                "hello",
                &TypeOptions {
                    humanlike: true,
                    typo_rate: 1.0,
                    seed: Some(7),
                    ..TypeOptions::default()
                },
            )
            .unwrap();
            // Every wrong key is backspaced away.
            assert_eq!(page.element(node).unwrap().value.as_deref(), Some("hello"));
            let backspaces: Vec<_> = page
                .dispatched()
                .into_iter()
                .filter(|(_, e)| e.key.as_deref() == Some("Backspace"))
                .collect();
            assert!(!backspaces.is_empty());
        }

        #[test]
        fn seeded_runs_are_reproducible() {
            let run = || {
                let (page, _) = page_with_input();
                let mut sim = Simulator::new(page.clone());
                sim.type_text(
                    "#name",
                    "determinism",
                    &TypeOptions {
                        humanlike: true,
                        typo_rate: 0.5,
                        seed: Some(42),
                        ..TypeOptions::default()
                    },
                )
                .unwrap();
                (page.dispatched_names(), page.paused_ms())
            };
            assert_eq!(run(), run());
        }

        #[test]
        fn blur_after_releases_focus() {
            let (page, _) = page_with_input();
            let mut sim = Simulator::new(page.clone());
            sim.type_text(
                "#name",
                "x",
                &TypeOptions {
                    blur_after: true,
                    ..TypeOptions::default()
                },
            )
            .unwrap();
            assert_eq!(page.active_element(), None);
        }
    }

    mod key_tests {
        use super::*;

        #[test]
        fn combo_presses_modifiers_then_key() {
            let (page, node) = page_with_input();
            page.set_id(node, "name");
            let mut sim = Simulator::new(page.clone());
            page.focus(node);
            sim.press_key("Control+Shift+K", 1).unwrap();

            let events = page.dispatched();
            let keydowns: Vec<_> = events
                .iter()
                .filter(|(_, e)| e.name == "keydown")
                .map(|(_, e)| e.key.clone().unwrap())
                .collect();
            assert_eq!(keydowns.len(), 3);
            assert_eq!(keydowns[2], "K");
            assert!(keydowns[..2].contains(&"Control".to_string()));
            assert!(keydowns[..2].contains(&"Shift".to_string()));

            let main = events
                .iter()
                .find(|(_, e)| e.name == "keydown" && e.key.as_deref() == Some("K"))
                .unwrap();
            assert_eq!(main.1.modifiers.len(), 2);

            let keyups = events.iter().filter(|(_, e)| e.name == "keyup").count();
            assert_eq!(keyups, 3);
        }

        #[test]
        fn repeat_flags_subsequent_keydowns() {
            let (page, _) = page_with_input();
            let mut sim = Simulator::new(page.clone());
            sim.press_key("a", 3).unwrap();
            let repeats: Vec<bool> = page
                .dispatched()
                .into_iter()
                .filter(|(_, e)| e.name == "keydown")
                .map(|(_, e)| e.repeat)
                .collect();
            assert_eq!(repeats, vec![false, true, true]);
        }

        #[test]
        fn empty_combo_is_an_input_error() {
            let page = FakePage::shared();
            let mut sim = Simulator::new(page);
            assert!(matches!(
                sim.press_key("", 1),
                Err(VigiaError::InputError { .. })
            ));
            assert!(matches!(
                sim.press_key("+K", 1),
                Err(VigiaError::InputError { .. })
            ));
        }
    }

    mod adjacency_tests {
        use super::*;

        #[test]
        fn adjacent_keys_are_physical_neighbors() {
            let mut jitter = Jitter::new(1);
            for _ in 0..50 {
                let k = adjacent_key('g', &mut jitter).unwrap();
                assert!("fhtyvb".contains(k), "unexpected neighbor {k}");
            }
        }

        #[test]
        fn case_is_preserved() {
            let mut jitter = Jitter::new(1);
            let k = adjacent_key('G', &mut jitter).unwrap();
            assert!(k.is_ascii_uppercase());
        }

        #[test]
        fn non_letters_have_no_neighbor() {
            let mut jitter = Jitter::new(1);
            assert!(adjacent_key('!', &mut jitter).is_none());
            assert!(adjacent_key(' ', &mut jitter).is_none());
        }
    }
}
