//! Mutation watch engine.
//!
//! Observes a configurable root (and, optionally, every nested shadow tree)
//! for structural and attribute changes, filters noise through a compiled
//! rule set, and batches raw records behind a debounce timer. A flush
//! summarizes the batch into change counts plus a bounded list of notable
//! entries; a flush with zero net changes in every counted category emits
//! nothing.
//!
//! Stopping the watch discards the pending batch without a final flush,
//! the opposite of the semantic engine's flush-on-stop.

pub mod filter;

pub use filter::{detect_frameworks, CompiledRules, FilterPreset, FilterRules};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

use crate::clock::ClockHandle;
use crate::debounce::Debouncer;
use crate::descriptor;
use crate::page::{ElementInfo, NodeId, ObserveOptions, ObserverHandle, PageHandle};

/// Default debounce window between the last record and a flush.
pub const MUTATION_DEBOUNCE_MS: u64 = 100;
/// Maximum notable entries reported per batch.
pub const MAX_NOTABLE: usize = 20;

/// Configuration for a mutation watch, replaced wholesale on each `watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationConfig {
    /// Root selector; defaults to the document body
    pub root_selector: Option<String>,
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
    /// Observe attribute changes
    pub observe_attributes: bool,
    /// Observe text-node changes
    pub observe_character_data: bool,
    /// Recurse into shadow trees with one observer per shadow root
    pub shadow_trees: bool,
    /// Named filter preset
    pub preset: String,
    /// Merge presets selected by the framework probe
    pub auto_detect: bool,
    /// User-supplied rule overrides merged onto the presets
    pub overrides: FilterRules,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            root_selector: None,
            debounce_ms: MUTATION_DEBOUNCE_MS,
            observe_attributes: true,
            observe_character_data: false,
            shadow_trees: true,
            preset: "smart".to_string(),
            auto_detect: true,
            overrides: FilterRules::default(),
        }
    }
}

/// A raw change record delivered by a host observer.
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// Nodes added to the tree
    Added {
        /// Added element handles (still queryable)
        nodes: Vec<NodeId>,
    },
    /// Nodes removed from the tree
    Removed {
        /// Last-known snapshots of the removed elements
        nodes: Vec<ElementInfo>,
    },
    /// An attribute changed
    Attribute {
        /// Element whose attribute changed
        target: NodeId,
        /// Attribute name
        name: String,
        /// Previous value
        old: Option<String>,
        /// New value
        new: Option<String>,
    },
    /// A text node changed
    CharacterData {
        /// Owning element
        target: NodeId,
    },
}

/// Kind of a notable change entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotableKind {
    /// Element added
    Added,
    /// Element removed
    Removed,
    /// Attribute changed
    Attribute,
}

/// A change judged significant enough to report individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotableChange {
    /// Change kind
    pub kind: NotableKind,
    /// Descriptor of the element involved
    pub target: String,
    /// Extra detail (attribute name, class token diff)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Summarized batch emitted after a debounce flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatch {
    /// Elements added
    pub added: usize,
    /// Elements removed
    pub removed: usize,
    /// Attribute changes kept
    pub attributes: usize,
    /// Text changes
    pub text: usize,
    /// Up to [`MAX_NOTABLE`] notable entries
    pub notable: Vec<NotableChange>,
    /// Changes suppressed by the filter rules
    pub ignored: usize,
}

impl MutationBatch {
    /// Whether every counted category is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.attributes == 0 && self.text == 0
    }
}

/// The mutation watch engine.
pub struct MutationEngine {
    page: PageHandle,
    clock: ClockHandle,
    config: Option<MutationConfig>,
    rules: Option<CompiledRules>,
    observers: Vec<ObserverHandle>,
    pending: Debouncer<Vec<MutationRecord>>,
}

impl std::fmt::Debug for MutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationEngine")
            .field("watching", &self.is_watching())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl MutationEngine {
    /// Create an idle engine.
    #[must_use]
    pub fn new(page: PageHandle, clock: ClockHandle) -> Self {
        Self {
            page,
            clock,
            config: None,
            rules: None,
            observers: Vec::new(),
            pending: Debouncer::new(MUTATION_DEBOUNCE_MS),
        }
    }

    /// Whether a watch is active.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.config.is_some()
    }

    /// Start (or replace) a watch with the given configuration.
    pub fn watch(&mut self, config: MutationConfig) {
        self.unwatch();

        let mut rules = FilterPreset::parse(&config.preset)
            .unwrap_or(FilterPreset::Smart)
            .rules();
        if config.auto_detect {
            for preset in detect_frameworks(self.page.as_ref()) {
                rules = rules.merged(preset.rules());
            }
        }
        rules = rules.merged(config.overrides.clone());
        self.rules = Some(CompiledRules::compile(&rules));
        self.pending = Debouncer::new(config.debounce_ms);

        let root = config
            .root_selector
            .as_deref()
            .and_then(|sel| self.page.query(sel))
            .unwrap_or_else(|| self.page.document_root());
        let opts = ObserveOptions {
            child_list: true,
            attributes: config.observe_attributes,
            character_data: config.observe_character_data,
            subtree: true,
        };
        self.observers.push(self.page.observe(root, &opts));
        if config.shadow_trees {
            self.observe_shadow_roots(root, &opts);
        }
        debug!(observers = self.observers.len(), "mutation watch started");
        self.config = Some(config);
    }

    /// Stop watching. Disconnects every observer and discards the pending
    /// queue without a final flush; unflushed changes are lost.
    pub fn unwatch(&mut self) {
        for handle in self.observers.drain(..) {
            self.page.disconnect(&handle);
        }
        self.pending.cancel();
        self.config = None;
        self.rules = None;
    }

    /// Status summary for the protocol.
    #[must_use]
    pub fn status(&self) -> Value {
        json!({
            "watching": self.is_watching(),
            "observers": self.observers.len(),
            "pending": self.pending.pending().map_or(0, Vec::len),
            "config": self.config,
        })
    }

    /// Append a raw change record and reset the debounce timer.
    pub fn record(&mut self, record: MutationRecord) {
        if self.config.is_none() {
            return;
        }
        let now = self.clock.now_ms();
        // New elements may host shadow roots of their own.
        if let MutationRecord::Added { nodes } = &record {
            let shadow = self
                .config
                .as_ref()
                .is_some_and(|c| c.shadow_trees);
            if shadow {
                let opts = self.current_opts();
                for node in nodes.clone() {
                    self.observe_shadow_roots(node, &opts);
                }
            }
        }
        if self.pending.is_pending() {
            if let Some(records) = self.pending.pending_mut() {
                records.push(record);
            }
            self.pending.touch(now);
        } else {
            self.pending.arm(vec![record], now);
        }
    }

    /// Flush the batch if the debounce window has elapsed.
    ///
    /// Returns `None` while the timer is still running or when the summary
    /// has zero net changes in every counted category.
    pub fn tick(&mut self) -> Option<MutationBatch> {
        let now = self.clock.now_ms();
        let records = self.pending.take_if_due(now)?;
        let batch = self.summarize(records);
        if batch.is_empty() {
            return None;
        }
        Some(batch)
    }

    fn current_opts(&self) -> ObserveOptions {
        self.config.as_ref().map_or_else(ObserveOptions::default, |c| ObserveOptions {
            child_list: true,
            attributes: c.observe_attributes,
            character_data: c.observe_character_data,
            subtree: true,
        })
    }

    /// Walk a subtree and attach one observer per discovered shadow root.
    fn observe_shadow_roots(&mut self, root: NodeId, opts: &ObserveOptions) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(shadow) = self.page.shadow_root(node) {
                self.observers.push(self.page.observe(shadow, opts));
                stack.push(shadow);
            }
            stack.extend(self.page.children(node));
        }
    }

    fn summarize(&self, records: Vec<MutationRecord>) -> MutationBatch {
        let mut batch = MutationBatch::default();
        let Some(rules) = &self.rules else {
            return batch;
        };
        for record in records {
            match record {
                MutationRecord::Added { nodes } => {
                    for node in nodes {
                        self.summarize_added(rules, node, &mut batch);
                    }
                }
                MutationRecord::Removed { nodes } => {
                    for snapshot in nodes {
                        self.summarize_removed(rules, &snapshot, &mut batch);
                    }
                }
                MutationRecord::Attribute {
                    target,
                    name,
                    old,
                    new,
                } => {
                    self.summarize_attribute(rules, target, &name, old, new, &mut batch);
                }
                MutationRecord::CharacterData { target } => {
                    if rules.allowed(self.page.as_ref(), target) {
                        batch.text += 1;
                    }
                }
            }
        }
        batch
    }

    fn summarize_added(&self, rules: &CompiledRules, node: NodeId, batch: &mut MutationBatch) {
        let Some(info) = self.page.element(node) else {
            // Added and removed again before the flush.
            batch.ignored += 1;
            return;
        };
        if !rules.allowed(self.page.as_ref(), node) {
            return;
        }
        if rules.element_ignored(self.page.as_ref(), node, &info.tag) {
            batch.ignored += 1;
            return;
        }
        batch.added += 1;
        if self.node_notable(rules, &info) {
            self.push_notable(batch, NotableKind::Added, descriptor_text(self.page.as_ref(), Some(node), &info), None);
        } else {
            batch.ignored += 1;
        }
    }

    fn summarize_removed(
        &self,
        rules: &CompiledRules,
        snapshot: &ElementInfo,
        batch: &mut MutationBatch,
    ) {
        if rules.tag_ignored(&snapshot.tag) {
            batch.ignored += 1;
            return;
        }
        batch.removed += 1;
        if self.node_notable(rules, snapshot) {
            self.push_notable(
                batch,
                NotableKind::Removed,
                descriptor_text(self.page.as_ref(), None, snapshot),
                None,
            );
        } else {
            batch.ignored += 1;
        }
    }

    fn summarize_attribute(
        &self,
        rules: &CompiledRules,
        target: NodeId,
        name: &str,
        old: Option<String>,
        new: Option<String>,
        batch: &mut MutationBatch,
    ) {
        if !rules.allowed(self.page.as_ref(), target) {
            return;
        }
        if name == "class" {
            self.summarize_class_change(rules, target, old.as_deref(), new.as_deref(), batch);
            return;
        }
        if rules.attr_ignored(name) && !rules.attr_interesting(name) {
            batch.ignored += 1;
            return;
        }
        batch.attributes += 1;
        if rules.attr_interesting(name) {
            if let Some(info) = self.page.element(target) {
                self.push_notable(
                    batch,
                    NotableKind::Attribute,
                    descriptor_text(self.page.as_ref(), Some(target), &info),
                    Some(format!("{name}={}", new.as_deref().unwrap_or(""))),
                );
            }
        }
    }

    /// Class changes are diffed as before/after token sets; when every
    /// changed token is filtered out, the whole change counts as ignored.
    fn summarize_class_change(
        &self,
        rules: &CompiledRules,
        target: NodeId,
        old: Option<&str>,
        new: Option<&str>,
        batch: &mut MutationBatch,
    ) {
        let tokens = |s: Option<&str>| -> BTreeSet<String> {
            s.unwrap_or("")
                .split_whitespace()
                .map(String::from)
                .collect()
        };
        let before = tokens(old);
        let after = tokens(new);
        let added: Vec<&String> = after.difference(&before).collect();
        let removed: Vec<&String> = before.difference(&after).collect();
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let surviving_added: Vec<&&String> = added
            .iter()
            .filter(|t| rules.class_change_survives(t))
            .collect();
        let surviving_removed: Vec<&&String> = removed
            .iter()
            .filter(|t| rules.class_change_survives(t))
            .collect();
        if surviving_added.is_empty() && surviving_removed.is_empty() {
            batch.ignored += 1;
            return;
        }
        batch.attributes += 1;
        if let Some(info) = self.page.element(target) {
            let mut detail = String::from("class:");
            for t in &surviving_added {
                detail.push_str(" +");
                detail.push_str(t);
            }
            for t in &surviving_removed {
                detail.push_str(" -");
                detail.push_str(t);
            }
            self.push_notable(
                batch,
                NotableKind::Attribute,
                descriptor_text(self.page.as_ref(), Some(target), &info),
                Some(detail),
            );
        }
    }

    /// An added/removed node is notable if it has an id, a semantically
    /// significant tag, is a custom element, or carries interesting
    /// classes/attributes after filtering.
    fn node_notable(&self, rules: &CompiledRules, info: &ElementInfo) -> bool {
        if info.id.as_deref().is_some_and(|id| !id.is_empty()) {
            return true;
        }
        if info.is_significant_tag() {
            return true;
        }
        if self.page.is_custom_element(&info.tag) {
            return true;
        }
        if info
            .classes
            .iter()
            .any(|c| rules.class_interesting(c) && !rules.class_ignored(c))
        {
            return true;
        }
        info.attributes.keys().any(|a| rules.attr_interesting(a))
    }

    fn push_notable(
        &self,
        batch: &mut MutationBatch,
        kind: NotableKind,
        target: String,
        detail: Option<String>,
    ) {
        if batch.notable.len() < MAX_NOTABLE {
            batch.notable.push(NotableChange {
                kind,
                target,
                detail,
            });
        }
    }
}

fn descriptor_text(
    page: &dyn crate::page::PageAdapter,
    node: Option<NodeId>,
    info: &ElementInfo,
) -> String {
    match node {
        Some(n) => descriptor::resolve(page, n).description,
        None => info
            .id
            .as_deref()
            .map_or_else(|| info.tag.clone(), |id| format!("#{id}")),
    }
}
