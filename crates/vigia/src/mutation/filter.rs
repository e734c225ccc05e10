//! Rule-based mutation noise filtering.
//!
//! A rule set combines ignore/interesting class patterns, attribute-name
//! prefixes, element selectors, and an optional allow-list. Named presets
//! are tuned for known front-end idioms and can be merged with user
//! overrides; a lightweight framework probe picks additional presets from
//! page signatures. Patterns are compiled once per rule-set activation:
//! regex first, literal substring fallback when the pattern is not valid
//! regex.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::{NodeId, PageAdapter};

/// User-facing filter rule set, merge-able.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterRules {
    /// Class patterns whose changes are noise
    pub ignore_classes: Vec<String>,
    /// Attribute-name prefixes whose changes are noise
    pub ignore_attribute_prefixes: Vec<String>,
    /// Element selectors/tags excluded entirely
    pub ignore_elements: Vec<String>,
    /// Class patterns that make a change notable
    pub interesting_classes: Vec<String>,
    /// Attribute-name prefixes that make a change notable
    pub interesting_attribute_prefixes: Vec<String>,
    /// When present, only elements matching these selectors are considered
    pub allowlist: Option<Vec<String>>,
}

impl FilterRules {
    /// Merge another rule set into this one. List fields append; a
    /// non-empty allow-list in `other` replaces ours.
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.ignore_classes.extend(other.ignore_classes);
        self.ignore_attribute_prefixes
            .extend(other.ignore_attribute_prefixes);
        self.ignore_elements.extend(other.ignore_elements);
        self.interesting_classes.extend(other.interesting_classes);
        self.interesting_attribute_prefixes
            .extend(other.interesting_attribute_prefixes);
        if other.allowlist.is_some() {
            self.allowlist = other.allowlist;
        }
        self
    }
}

/// Named filter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPreset {
    /// No filtering at all
    None,
    /// Suppress nearly everything
    Minimal,
    /// Generic default tuned for common noise
    Smart,
    /// React-specific noise
    React,
    /// Vue-specific noise
    Vue,
    /// Angular-specific noise
    Angular,
}

impl FilterPreset {
    /// Parse a preset name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "minimal" => Some(Self::Minimal),
            "smart" => Some(Self::Smart),
            "react" => Some(Self::React),
            "vue" => Some(Self::Vue),
            "angular" => Some(Self::Angular),
            _ => None,
        }
    }

    /// Rules for this preset.
    #[must_use]
    pub fn rules(&self) -> FilterRules {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        match self {
            Self::None => FilterRules::default(),
            Self::Minimal => FilterRules {
                // Match-everything patterns: only ids, significant tags, and
                // custom elements survive.
                ignore_classes: strings(&[".*"]),
                ignore_attribute_prefixes: strings(&[""]),
                ..FilterRules::default()
            },
            Self::Smart => FilterRules {
                ignore_classes: strings(&[
                    "^(is|has)-",
                    "active",
                    "hover",
                    "focus-visible",
                    "transition",
                    "animat",
                    "fade",
                    "slide",
                    "collaps",
                    "ripple",
                ]),
                ignore_attribute_prefixes: strings(&[
                    "style",
                    "data-styled",
                    "data-emotion",
                    "data-highlighted",
                    "aria-activedescendant",
                ]),
                ignore_elements: strings(&["script", "style", "link", "meta", "noscript"]),
                interesting_classes: strings(&[
                    "error", "warning", "success", "invalid", "alert", "modal", "toast",
                    "notification", "loading", "disabled",
                ]),
                interesting_attribute_prefixes: strings(&[
                    "aria-", "data-state", "disabled", "hidden", "open", "value", "checked",
                    "selected", "required",
                ]),
                allowlist: None,
            },
            Self::React => FilterRules {
                ignore_classes: strings(&["^css-", "^sc-", "^jsx-"]),
                ignore_attribute_prefixes: strings(&["data-react", "data-radix"]),
                interesting_attribute_prefixes: strings(&["data-state"]),
                ..FilterRules::default()
            },
            Self::Vue => FilterRules {
                ignore_classes: strings(&["^v-enter", "^v-leave", "^v-move"]),
                ignore_attribute_prefixes: strings(&["data-v-"]),
                ..FilterRules::default()
            },
            Self::Angular => FilterRules {
                ignore_classes: strings(&["^ng-"]),
                ignore_attribute_prefixes: strings(&["_ngcontent", "_nghost", "ng-reflect"]),
                ..FilterRules::default()
            },
        }
    }
}

/// Probe the page for framework signatures and return matching presets.
#[must_use]
pub fn detect_frameworks(page: &dyn PageAdapter) -> Vec<FilterPreset> {
    let mut detected = Vec::new();
    if page.has_global("React")
        || page.has_global("__REACT_DEVTOOLS_GLOBAL_HOOK__")
        || page.query("[data-reactroot]").is_some()
    {
        detected.push(FilterPreset::React);
    }
    if page.has_global("Vue") || page.has_global("__VUE__") {
        detected.push(FilterPreset::Vue);
    }
    if page.has_global("ng") || page.query("[ng-version]").is_some() {
        detected.push(FilterPreset::Angular);
    }
    if !detected.is_empty() {
        debug!(?detected, "framework signatures detected");
    }
    detected
}

/// A pattern compiled once per rule-set activation.
///
/// Regex first; a pattern that fails to compile falls back to literal
/// substring matching, preserving the original match semantics.
#[derive(Debug)]
pub struct CompiledPattern {
    regex: Option<Regex>,
    literal: String,
}

impl CompiledPattern {
    /// Compile a pattern.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        Self {
            regex: Regex::new(pattern).ok(),
            literal: pattern.to_string(),
        }
    }

    /// Whether the pattern matches a candidate string.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(candidate),
            None => candidate.contains(&self.literal),
        }
    }
}

/// Active, compiled rule set.
#[derive(Debug)]
pub struct CompiledRules {
    ignore_classes: Vec<CompiledPattern>,
    interesting_classes: Vec<CompiledPattern>,
    ignore_attribute_prefixes: Vec<String>,
    interesting_attribute_prefixes: Vec<String>,
    ignore_elements: Vec<String>,
    allowlist: Option<Vec<String>>,
}

impl CompiledRules {
    /// Compile a merged rule set.
    #[must_use]
    pub fn compile(rules: &FilterRules) -> Self {
        let compile_all =
            |patterns: &[String]| patterns.iter().map(|p| CompiledPattern::new(p)).collect();
        Self {
            ignore_classes: compile_all(&rules.ignore_classes),
            interesting_classes: compile_all(&rules.interesting_classes),
            ignore_attribute_prefixes: rules.ignore_attribute_prefixes.clone(),
            interesting_attribute_prefixes: rules.interesting_attribute_prefixes.clone(),
            ignore_elements: rules.ignore_elements.clone(),
            allowlist: rules.allowlist.clone(),
        }
    }

    /// Whether a class token matches an ignore pattern.
    #[must_use]
    pub fn class_ignored(&self, token: &str) -> bool {
        self.ignore_classes.iter().any(|p| p.matches(token))
    }

    /// Whether a class token matches an interesting pattern.
    #[must_use]
    pub fn class_interesting(&self, token: &str) -> bool {
        self.interesting_classes.iter().any(|p| p.matches(token))
    }

    /// Whether a changed class token survives filtering.
    #[must_use]
    pub fn class_change_survives(&self, token: &str) -> bool {
        self.class_interesting(token) || !self.class_ignored(token)
    }

    /// Whether an attribute name matches an ignore prefix.
    #[must_use]
    pub fn attr_ignored(&self, name: &str) -> bool {
        self.ignore_attribute_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }

    /// Whether an attribute name matches an interesting prefix.
    #[must_use]
    pub fn attr_interesting(&self, name: &str) -> bool {
        self.interesting_attribute_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }

    /// Whether an element is excluded entirely by tag or selector.
    #[must_use]
    pub fn element_ignored(&self, page: &dyn PageAdapter, node: NodeId, tag: &str) -> bool {
        self.ignore_elements
            .iter()
            .any(|sel| sel == tag || page.matches(node, sel))
    }

    /// Whether a removed-node tag is excluded (selector matching is not
    /// possible once the node is gone).
    #[must_use]
    pub fn tag_ignored(&self, tag: &str) -> bool {
        self.ignore_elements.iter().any(|sel| sel == tag)
    }

    /// Allow-list gate: when present, only matching elements (or elements
    /// inside matching ancestors) are considered at all.
    #[must_use]
    pub fn allowed(&self, page: &dyn PageAdapter, node: NodeId) -> bool {
        let Some(allowlist) = &self.allowlist else {
            return true;
        };
        let mut current = Some(node);
        while let Some(n) = current {
            if allowlist.iter().any(|sel| page.matches(n, sel)) {
                return true;
            }
            current = page.parent(n);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::FakePage;

    #[test]
    fn regex_pattern_matches() {
        let p = CompiledPattern::new("^ng-");
        assert!(p.matches("ng-star-inserted"));
        assert!(!p.matches("strong-text"));
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let p = CompiledPattern::new("[unclosed");
        assert!(p.matches("class-[unclosed-thing"));
        assert!(!p.matches("other"));
    }

    #[test]
    fn minimal_preset_ignores_every_class() {
        let rules = CompiledRules::compile(&FilterPreset::Minimal.rules());
        assert!(rules.class_ignored("foo"));
        assert!(rules.attr_ignored("anything"));
        assert!(!rules.class_interesting("foo"));
    }

    #[test]
    fn smart_preset_keeps_error_classes_interesting() {
        let rules = CompiledRules::compile(&FilterPreset::Smart.rules());
        assert!(rules.class_interesting("error-message"));
        assert!(rules.class_ignored("is-active"));
        assert!(rules.attr_interesting("aria-expanded"));
        assert!(rules.attr_ignored("style"));
    }

    #[test]
    fn merge_appends_lists_and_replaces_allowlist() {
        let base = FilterPreset::Smart.rules();
        let overrides = FilterRules {
            ignore_classes: vec!["^custom-".to_string()],
            allowlist: Some(vec!["#app".to_string()]),
            ..FilterRules::default()
        };
        let merged = base.merged(overrides);
        assert!(merged.ignore_classes.contains(&"^custom-".to_string()));
        assert!(merged.ignore_classes.contains(&"active".to_string()));
        assert_eq!(merged.allowlist, Some(vec!["#app".to_string()]));
    }

    #[test]
    fn allowlist_covers_descendants() {
        let page = FakePage::new();
        let app = page.add_element(None, "div");
        page.set_id(app, "app");
        let inner = page.add_element(Some(app), "span");
        let outside = page.add_element(None, "span");

        let rules = CompiledRules::compile(&FilterRules {
            allowlist: Some(vec!["#app".to_string()]),
            ..FilterRules::default()
        });
        assert!(rules.allowed(&page, inner));
        assert!(!rules.allowed(&page, outside));
    }

    #[test]
    fn framework_probe_reads_globals_and_markers() {
        let page = FakePage::new();
        assert!(detect_frameworks(&page).is_empty());
        page.define_global("React");
        let root = page.add_element(None, "div");
        page.set_attr(root, "ng-version", "17.0.1");
        let detected = detect_frameworks(&page);
        assert!(detected.contains(&FilterPreset::React));
        assert!(detected.contains(&FilterPreset::Angular));
        assert!(!detected.contains(&FilterPreset::Vue));
    }
}
