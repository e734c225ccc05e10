//! User-driven rectangular element selection.
//!
//! The operator asks the page's user to drag out a rectangle; the engine
//! resolves every element intersecting it into stable descriptors. The
//! session is a small state machine driven from two sides: the protocol
//! (start, cancel, status, result, clear) and the page overlay
//! (`complete` with the drawn rectangle).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::clock::ClockHandle;
use crate::descriptor;
use crate::page::{NodeId, PageHandle, Rect};
use crate::result::{VigiaError, VigiaResult};

/// Where the selection session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPhase {
    /// No session running
    Idle,
    /// Waiting for the user to draw a rectangle
    Active,
    /// A rectangle was drawn and resolved
    Complete,
}

/// Resolved outcome of a completed selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    /// The drawn rectangle in viewport coordinates
    pub rect: Rect,
    /// Descriptors of every intersecting element, document order
    pub descriptors: Vec<String>,
    /// Engine time of completion
    pub completed_ms: u64,
}

/// Rectangular selection session.
pub struct SelectionSession {
    page: PageHandle,
    clock: ClockHandle,
    phase: SelectionPhase,
    result: Option<SelectionResult>,
}

impl std::fmt::Debug for SelectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionSession")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl SelectionSession {
    /// Create an idle session.
    #[must_use]
    pub fn new(page: PageHandle, clock: ClockHandle) -> Self {
        Self {
            page,
            clock,
            phase: SelectionPhase::Idle,
            result: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SelectionPhase {
        self.phase
    }

    /// Arm the session; the page overlay takes over until `complete` or
    /// `cancel`.
    pub fn start(&mut self) -> VigiaResult<()> {
        if self.phase == SelectionPhase::Active {
            return Err(VigiaError::invalid_state("selection already active"));
        }
        self.phase = SelectionPhase::Active;
        self.result = None;
        debug!("selection session armed");
        Ok(())
    }

    /// Abandon an active session; a completed result survives.
    pub fn cancel(&mut self) {
        if self.phase == SelectionPhase::Active {
            self.phase = if self.result.is_some() {
                SelectionPhase::Complete
            } else {
                SelectionPhase::Idle
            };
        }
    }

    /// Resolve the drawn rectangle into element descriptors.
    ///
    /// Called by the page overlay when the user releases the drag.
    pub fn complete(&mut self, rect: Rect) -> VigiaResult<SelectionResult> {
        if self.phase != SelectionPhase::Active {
            return Err(VigiaError::invalid_state("no selection in progress"));
        }
        let mut descriptors = Vec::new();
        for node in self.elements_in(rect) {
            descriptors.push(descriptor::resolve(self.page.as_ref(), node).description);
        }
        debug!(elements = descriptors.len(), "selection resolved");
        let result = SelectionResult {
            rect,
            descriptors,
            completed_ms: self.clock.now_ms(),
        };
        self.result = Some(result.clone());
        self.phase = SelectionPhase::Complete;
        Ok(result)
    }

    /// The last completed result, if any.
    #[must_use]
    pub const fn result(&self) -> Option<&SelectionResult> {
        self.result.as_ref()
    }

    /// Drop any result and return to idle.
    pub fn clear(&mut self) {
        self.phase = SelectionPhase::Idle;
        self.result = None;
    }

    /// Status summary for the protocol.
    #[must_use]
    pub fn status(&self) -> Value {
        json!({
            "phase": self.phase,
            "elements": self.result.as_ref().map_or(0, |r| r.descriptors.len()),
        })
    }

    /// Elements whose bounds intersect the rectangle, document order.
    fn elements_in(&self, rect: Rect) -> Vec<NodeId> {
        let mut hits = Vec::new();
        let mut stack = vec![self.page.document_root()];
        while let Some(node) = stack.pop() {
            if let Some(info) = self.page.element(node) {
                if !info.bounds.is_empty() && info.bounds.intersects(&rect) {
                    hits.push(node);
                }
            }
            let mut children = self.page.children(node);
            children.reverse();
            stack.extend(children);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::page::fake::FakePage;
    use std::sync::Arc;

    fn session() -> (SelectionSession, Arc<FakePage>) {
        let page = FakePage::shared();
        let clock = FakeClock::handle_at(0);
        (SelectionSession::new(page.clone(), clock), page)
    }

    #[test]
    fn complete_resolves_intersecting_elements_in_order() {
        let (mut s, page) = session();
        let a = page.add_element(None, "button");
        page.set_id(a, "first");
        page.set_bounds(a, Rect::new(10.0, 10.0, 50.0, 20.0));
        let b = page.add_element(None, "button");
        page.set_id(b, "second");
        page.set_bounds(b, Rect::new(10.0, 50.0, 50.0, 20.0));
        let outside = page.add_element(None, "button");
        page.set_bounds(outside, Rect::new(900.0, 900.0, 50.0, 20.0));

        s.start().unwrap();
        let result = s.complete(Rect::new(0.0, 0.0, 100.0, 100.0)).unwrap();
        assert_eq!(result.descriptors, vec!["#first", "#second"]);
        assert_eq!(s.phase(), SelectionPhase::Complete);
    }

    #[test]
    fn complete_outside_active_phase_is_invalid() {
        let (mut s, _) = session();
        assert!(s.complete(Rect::new(0.0, 0.0, 10.0, 10.0)).is_err());
    }

    #[test]
    fn double_start_is_invalid_but_restart_after_clear_works() {
        let (mut s, _) = session();
        s.start().unwrap();
        assert!(s.start().is_err());
        s.clear();
        assert!(s.start().is_ok());
    }

    #[test]
    fn cancel_without_result_returns_to_idle() {
        let (mut s, _) = session();
        s.start().unwrap();
        s.cancel();
        assert_eq!(s.phase(), SelectionPhase::Idle);
        assert!(s.result().is_none());
    }

    #[test]
    fn restart_discards_previous_result() {
        let (mut s, page) = session();
        let a = page.add_element(None, "button");
        page.set_bounds(a, Rect::new(0.0, 0.0, 10.0, 10.0));
        s.start().unwrap();
        s.complete(Rect::new(0.0, 0.0, 20.0, 20.0)).unwrap();
        assert!(s.result().is_some());
        s.start().unwrap();
        assert!(s.result().is_none());
    }
}
