//! Stable, human-readable target descriptors.
//!
//! Resolution walks an ordered priority chain and stops at the first source
//! that yields a meaningful name. For a fixed DOM state the result is
//! deterministic, so descriptors can be compared across event batches.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::page::{ElementInfo, NodeId, PageAdapter};

/// Which rung of the priority chain produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorSource {
    /// Non-generated `id` attribute
    Id,
    /// `aria-label`
    AriaLabel,
    /// `title` attribute
    Title,
    /// Associated `<label>` element
    Label,
    /// Test-id attribute
    TestId,
    /// `name` attribute on a form control
    Name,
    /// Explicit role plus accessible name
    Role,
    /// Heading of the nearest landmark ancestor
    LandmarkHeading,
    /// Visible text of a button or link
    Text,
    /// Page-unique filtered class
    ClassList,
    /// Position among siblings inside a landmark
    Positional,
    /// Structural path fallback
    StructuralPath,
}

/// Human-meaningful description of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// The descriptor text
    pub description: String,
    /// Which resolution rung produced it
    pub source: DescriptorSource,
    /// Element tag
    pub tag: String,
}

/// Test-id attributes checked in order.
const TEST_ID_ATTRS: &[&str] = &["data-testid", "data-test-id", "data-test", "data-cy"];

/// Landmark tags used for positional descriptions.
const LANDMARK_TAGS: &[&str] = &["nav", "main", "header", "footer", "aside", "form", "section"];

fn generated_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Framework-generated ids: long digit runs, uuid chunks, react useId
    // colons, ember/radix prefixes.
    RE.get_or_init(|| {
        Regex::new(r"(\d{3,}|^:r|^radix-|^ember\d|^__|[0-9a-f]{8}-[0-9a-f]{4})").unwrap()
    })
}

fn utility_class_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^(
                [pm][txylrb]?-
                | (?:min-|max-)?[wh]-
                | text- | bg- | font- | leading- | tracking-
                | flex | grid | gap- | space- | col- | row-
                | border | rounded | shadow | ring-
                | items- | justify- | self- | place-
                | top- | left- | right- | bottom- | inset- | z-
                | overflow- | opacity- | transition | duration- | ease-
                | absolute$ | relative$ | fixed$ | sticky$ | block$ | inline
                | hidden$ | sr-only$
                | (?:sm|md|lg|xl|2xl|hover|focus|active|dark):
                | css- | sc- | jsx-
            )",
        )
        .unwrap()
    })
}

/// Whether an id looks machine-generated.
#[must_use]
pub fn is_generated_id(id: &str) -> bool {
    id.len() > 24 || generated_id_pattern().is_match(id)
}

/// Class tokens with utility-class noise removed.
#[must_use]
pub fn filtered_classes(info: &ElementInfo) -> Vec<String> {
    info.classes
        .iter()
        .filter(|c| !utility_class_pattern().is_match(c))
        .cloned()
        .collect()
}

/// Resolve a descriptor for an element.
///
/// Falls back to a structural path when nothing better is available, so it
/// always produces something.
#[must_use]
pub fn resolve(page: &dyn PageAdapter, node: NodeId) -> TargetDescriptor {
    let Some(info) = page.element(node) else {
        return TargetDescriptor {
            description: "(detached element)".to_string(),
            source: DescriptorSource::StructuralPath,
            tag: String::new(),
        };
    };

    let make = |description: String, source: DescriptorSource| TargetDescriptor {
        description,
        source,
        tag: info.tag.clone(),
    };

    if let Some(id) = info.id.as_deref() {
        if !id.is_empty() && !is_generated_id(id) {
            return make(format!("#{id}"), DescriptorSource::Id);
        }
    }

    if let Some(label) = nonempty(info.attr("aria-label")) {
        return make(label, DescriptorSource::AriaLabel);
    }

    if let Some(title) = nonempty(info.attr("title")) {
        return make(title, DescriptorSource::Title);
    }

    if let Some(label) = associated_label(page, node, &info) {
        return make(label, DescriptorSource::Label);
    }

    for attr in TEST_ID_ATTRS {
        if let Some(test_id) = nonempty(info.attr(attr)) {
            return make(test_id, DescriptorSource::TestId);
        }
    }

    if is_form_control(&info) {
        if let Some(name) = nonempty(info.attr("name")) {
            return make(format!("{} \"{name}\"", info.tag), DescriptorSource::Name);
        }
    }

    if let Some(role) = nonempty(info.attr("role")) {
        let name = accessible_name(&info);
        let description = if name.is_empty() {
            role
        } else {
            format!("{role} \"{name}\"")
        };
        return make(description, DescriptorSource::Role);
    }

    if let Some(heading) = landmark_heading(page, node) {
        if info.text.trim().is_empty() && !info.is_interactive() {
            return make(
                format!("{} under \"{heading}\"", info.tag),
                DescriptorSource::LandmarkHeading,
            );
        }
    }

    if matches!(info.tag.as_str(), "a" | "button" | "summary") {
        if let Some(text) = nonempty(Some(info.text.trim())) {
            return make(format!("\"{}\"", truncate(&text, 60)), DescriptorSource::Text);
        }
    }

    let filtered = filtered_classes(&info);
    if let Some(class) = filtered.first() {
        let selector = format!("{}.{class}", info.tag);
        if page.query_all(&selector).len() == 1 {
            return make(selector, DescriptorSource::ClassList);
        }
    }

    if let Some(position) = positional(page, node, &info) {
        return make(position, DescriptorSource::Positional);
    }

    make(structural_path(page, node), DescriptorSource::StructuralPath)
}

fn nonempty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn is_form_control(info: &ElementInfo) -> bool {
    matches!(info.tag.as_str(), "input" | "select" | "textarea" | "button")
}

fn accessible_name(info: &ElementInfo) -> String {
    info.attr("aria-label")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| info.text.trim().to_string(), String::from)
}

/// Label by `for`, by wrapping, or via `aria-labelledby`.
fn associated_label(page: &dyn PageAdapter, node: NodeId, info: &ElementInfo) -> Option<String> {
    if let Some(id) = info.id.as_deref() {
        if !id.is_empty() {
            if let Some(label) = page.query(&format!("label[for=\"{id}\"]")) {
                let text = page.element(label)?.text.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }

    if let Some(labelled_by) = info.attr("aria-labelledby") {
        for id in labelled_by.split_whitespace() {
            if let Some(source) = page.query(&format!("#{id}")) {
                let text = page.element(source)?.text.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }

    // Wrapping label
    let mut current = page.parent(node);
    while let Some(ancestor) = current {
        let ancestor_info = page.element(ancestor)?;
        if ancestor_info.tag == "label" {
            let text = ancestor_info.text.trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
        current = page.parent(ancestor);
    }
    None
}

fn is_landmark(info: &ElementInfo) -> bool {
    LANDMARK_TAGS.contains(&info.tag.as_str())
        || info.attr("role").is_some_and(|r| {
            matches!(
                r,
                "navigation" | "main" | "banner" | "contentinfo" | "complementary" | "search"
            )
        })
}

fn nearest_landmark(page: &dyn PageAdapter, node: NodeId) -> Option<(NodeId, ElementInfo)> {
    let mut current = page.parent(node);
    while let Some(ancestor) = current {
        let info = page.element(ancestor)?;
        if is_landmark(&info) {
            return Some((ancestor, info));
        }
        current = page.parent(ancestor);
    }
    None
}

/// First heading text inside the nearest landmark ancestor.
fn landmark_heading(page: &dyn PageAdapter, node: NodeId) -> Option<String> {
    let (landmark, _) = nearest_landmark(page, node)?;
    let mut stack = page.children(landmark);
    while let Some(candidate) = stack.pop() {
        let info = page.element(candidate)?;
        if matches!(info.tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            let text = info.text.trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
        stack.extend(page.children(candidate));
    }
    None
}

/// "button 2 of 5 in nav" style description.
fn positional(page: &dyn PageAdapter, node: NodeId, info: &ElementInfo) -> Option<String> {
    let (landmark, landmark_info) = nearest_landmark(page, node)?;
    let same_tag: Vec<NodeId> = descendants(page, landmark)
        .into_iter()
        .filter(|n| {
            page.element(*n)
                .is_some_and(|candidate| candidate.tag == info.tag)
        })
        .collect();
    let index = same_tag.iter().position(|n| *n == node)?;
    let landmark_name = landmark_info
        .attr("aria-label")
        .map_or_else(|| landmark_info.tag.clone(), String::from);
    Some(format!(
        "{} {} of {} in {landmark_name}",
        info.tag,
        index + 1,
        same_tag.len()
    ))
}

fn descendants(page: &dyn PageAdapter, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = page.children(root);
    stack.reverse();
    while let Some(n) = stack.pop() {
        out.push(n);
        let mut kids = page.children(n);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

/// Structural path with shadow boundary markers and nth-child disambiguation.
fn structural_path(page: &dyn PageAdapter, node: NodeId) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        let Some(info) = page.element(n) else { break };
        if page.is_shadow_root(n) {
            segments.push("::shadow".to_string());
            current = page.parent(n);
            continue;
        }
        let segment = match page.parent(n) {
            Some(parent) => {
                let siblings = page.children(parent);
                if siblings.len() > 1 {
                    let index = siblings.iter().position(|s| *s == n).unwrap_or(0);
                    format!("{}:nth-child({})", info.tag, index + 1)
                } else {
                    info.tag.clone()
                }
            }
            None => info.tag.clone(),
        };
        segments.push(segment);
        current = page.parent(n);
    }
    segments.reverse();
    segments.join(" > ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    }
}
