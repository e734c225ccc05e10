//! Subscription filtering over semantic events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::event::EventCategory;

/// Named subscription presets of increasing verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPreset {
    /// Interactions, navigation, and recording lifecycle only
    Minimal,
    /// Minimal plus input, mutations, and console
    Standard,
    /// Standard plus focus and scroll
    Detailed,
    /// Everything, including hover
    Debug,
}

impl SubscriptionPreset {
    /// Parse a preset name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "minimal" => Some(Self::Minimal),
            "standard" => Some(Self::Standard),
            "detailed" => Some(Self::Detailed),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    /// Categories included by this preset.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<EventCategory> {
        use EventCategory as C;
        let mut set: BTreeSet<C> =
            [C::Interaction, C::Navigation, C::Recording].into_iter().collect();
        if matches!(self, Self::Standard | Self::Detailed | Self::Debug) {
            set.extend([C::Input, C::Mutation, C::Console]);
        }
        if matches!(self, Self::Detailed | Self::Debug) {
            set.extend([C::Focus, C::Scroll]);
        }
        if matches!(self, Self::Debug) {
            set.insert(C::Hover);
        }
        set
    }
}

/// Active filter over which semantic events are kept and forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Allowed categories
    pub categories: BTreeSet<EventCategory>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::all()
    }
}

impl Subscription {
    /// Subscription allowing every category.
    #[must_use]
    pub fn all() -> Self {
        Self {
            categories: EventCategory::ALL.iter().copied().collect(),
        }
    }

    /// Subscription from a named preset.
    #[must_use]
    pub fn preset(preset: SubscriptionPreset) -> Self {
        Self {
            categories: preset.categories(),
        }
    }

    /// Subscription from an explicit category set.
    #[must_use]
    pub fn categories(categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }

    /// Whether a category passes the filter.
    #[must_use]
    pub fn allows(&self, category: EventCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventCategory as C;

    #[test]
    fn minimal_preset_categories() {
        let s = Subscription::preset(SubscriptionPreset::Minimal);
        assert!(s.allows(C::Interaction));
        assert!(s.allows(C::Navigation));
        assert!(s.allows(C::Recording));
        assert!(!s.allows(C::Input));
        assert!(!s.allows(C::Hover));
        assert!(!s.allows(C::Scroll));
    }

    #[test]
    fn presets_are_strictly_increasing() {
        let presets = [
            SubscriptionPreset::Minimal,
            SubscriptionPreset::Standard,
            SubscriptionPreset::Detailed,
            SubscriptionPreset::Debug,
        ];
        for pair in presets.windows(2) {
            let smaller = pair[0].categories();
            let larger = pair[1].categories();
            assert!(smaller.is_subset(&larger));
            assert!(smaller.len() < larger.len());
        }
    }

    #[test]
    fn debug_preset_covers_everything() {
        assert_eq!(
            SubscriptionPreset::Debug.categories().len(),
            C::ALL.len()
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(SubscriptionPreset::parse("minimal"), Some(SubscriptionPreset::Minimal));
        assert_eq!(SubscriptionPreset::parse("verbose"), None);
    }
}
