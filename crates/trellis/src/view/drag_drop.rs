//! Drag-and-drop negotiation.
//!
//! A [`DropNegotiator`] sits between the host widget's drag events and the
//! domain model. On every drag-over it resolves the requested kind from the
//! keyboard modifiers, asks the model whether it would accept the payload at
//! the resolved target and position, and turns the answer into
//! [`DropFeedback`] for the host to paint. On drop it asks the model to
//! perform the drop and reports the [`DropOutcome`].
//!
//! The negotiator never invents acceptance: a model that answers
//! [`DragDropKind::None`], answers with a kind the source does not allow, or
//! fails, rejects the drop.
//!
//! # Gesture lifecycle
//!
//! ```text
//! enter ──> drag_over* ──> drop   (Accepted | Rejected)
//!               │
//!               ├──> leave   (feedback cleared, gesture continues)
//!               └──> cancel  (feedback cleared, gesture over)
//! ```

use trellis_core::logging::{span_names, targets};
use trellis_core::{BindingError, Result};

use crate::model::{DragDropKind, DragPayload, DropEffects, DropPosition};

/// Fraction of an item's extent, at each edge, that selects a before/after
/// drop instead of an on-item drop.
pub const DEFAULT_EDGE_FRACTION: f32 = 0.2;

/// Keyboard modifier state during a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    /// Control key.
    pub ctrl: bool,
    /// Alt key.
    pub alt: bool,
    /// Shift key.
    pub shift: bool,
}

impl Modifiers {
    /// No modifiers held.
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
    };

    /// Control only.
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
        shift: false,
    };

    /// Alt only.
    pub const ALT: Self = Self {
        ctrl: false,
        alt: true,
        shift: false,
    };

    /// Shift only.
    pub const SHIFT: Self = Self {
        ctrl: false,
        alt: false,
        shift: true,
    };

    /// Control and Alt.
    pub const CTRL_ALT: Self = Self {
        ctrl: true,
        alt: true,
        shift: false,
    };
}

/// The kind a user asks for with `modifiers`, limited to what the source
/// allows.
///
/// Precedence: Alt (with or without Ctrl) links, Shift moves, Ctrl copies,
/// and with nothing applicable the drag moves. A modifier whose kind the
/// source does not allow is skipped.
pub fn requested_kind(modifiers: Modifiers, allowed: DropEffects) -> DragDropKind {
    if modifiers.alt && allowed.contains(DropEffects::LINK) {
        DragDropKind::Link
    } else if modifiers.shift && allowed.contains(DropEffects::MOVE) {
        DragDropKind::Move
    } else if modifiers.ctrl && allowed.contains(DropEffects::COPY) {
        DragDropKind::Copy
    } else if allowed.contains(DropEffects::MOVE) {
        DragDropKind::Move
    } else {
        DragDropKind::None
    }
}

/// Where a drop lands given the cursor `offset` into an item of `extent`.
///
/// The outer `edge_fraction` of the extent at either edge selects
/// [`Before`](DropPosition::Before) or [`After`](DropPosition::After); the
/// middle selects [`On`](DropPosition::On). When on-item drops are not
/// allowed, the midpoint splits before from after.
pub fn resolve_position(
    offset: f32,
    extent: f32,
    on_item_allowed: bool,
    edge_fraction: f32,
) -> DropPosition {
    if extent <= 0.0 {
        return if on_item_allowed {
            DropPosition::On
        } else {
            DropPosition::Before
        };
    }
    let ratio = (offset / extent).clamp(0.0, 1.0);
    if !on_item_allowed {
        return if ratio < 0.5 {
            DropPosition::Before
        } else {
            DropPosition::After
        };
    }
    let edge = edge_fraction.clamp(0.0, 0.5);
    if ratio <= edge {
        DropPosition::Before
    } else if ratio >= 1.0 - edge {
        DropPosition::After
    } else {
        DropPosition::On
    }
}

/// An insertion mark drawn next to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InsertMark<K> {
    /// The item the mark is drawn against.
    pub target: K,
    /// `true` to draw below the item, `false` above it.
    pub after: bool,
}

/// What the host should paint during a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropFeedback<K> {
    /// The effect to show on the cursor and to report to the source.
    pub effect: DragDropKind,
    /// Item to highlight for an on-item drop.
    pub highlight: Option<K>,
    /// Insertion mark for a before/after drop.
    pub insert_mark: Option<InsertMark<K>>,
}

impl<K> DropFeedback<K> {
    /// No effect, no highlight, no insertion mark.
    pub fn cleared() -> Self {
        Self {
            effect: DragDropKind::None,
            highlight: None,
            insert_mark: None,
        }
    }

    /// Returns `true` if nothing is painted.
    pub fn is_cleared(&self) -> bool {
        self.effect == DragDropKind::None && self.highlight.is_none() && self.insert_mark.is_none()
    }
}

impl<K: Clone> DropFeedback<K> {
    fn accepted(effect: DragDropKind, target: &K, position: DropPosition) -> Self {
        match position {
            DropPosition::On => Self {
                effect,
                highlight: Some(target.clone()),
                insert_mark: None,
            },
            DropPosition::Before | DropPosition::After => Self {
                effect,
                highlight: None,
                insert_mark: Some(InsertMark {
                    target: target.clone(),
                    after: position == DropPosition::After,
                }),
            },
        }
    }
}

impl<K> Default for DropFeedback<K> {
    fn default() -> Self {
        Self::cleared()
    }
}

/// The model side of a negotiation.
///
/// `K` identifies a drop target in the view (a row, a node), `T` is the
/// dragged item type.
pub trait DropTarget<K, T> {
    /// Whether `payload` would be accepted at `target`. Returns the kind that
    /// would be performed, or [`DragDropKind::None`].
    fn can_accept_drop(
        &self,
        target: &K,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> DragDropKind;

    /// Performs the drop. Returns the kind performed.
    fn accept_drop(
        &self,
        target: &K,
        payload: &DragPayload<T>,
        kind: DragDropKind,
        position: DropPosition,
    ) -> Result<DragDropKind>;
}

/// A completed drop.
#[derive(Debug, Clone)]
pub struct DropEvent<K, T> {
    /// Where the payload landed.
    pub target: K,
    /// Position relative to `target`.
    pub position: DropPosition,
    /// The kind the model performed.
    pub kind: DragDropKind,
    /// The dropped items.
    pub payload: DragPayload<T>,
}

/// Result of [`DropNegotiator::drop`].
#[derive(Debug, Clone)]
pub enum DropOutcome<K, T> {
    /// The model performed the drop.
    Accepted(DropEvent<K, T>),
    /// Nothing happened.
    Rejected,
}

impl<K, T> DropOutcome<K, T> {
    /// Returns `true` for [`DropOutcome::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, DropOutcome::Accepted(_))
    }

    /// The kind performed, [`DragDropKind::None`] when rejected.
    pub fn kind(&self) -> DragDropKind {
        match self {
            DropOutcome::Accepted(event) => event.kind,
            DropOutcome::Rejected => DragDropKind::None,
        }
    }

    /// The drop event, if accepted.
    pub fn into_event(self) -> Option<DropEvent<K, T>> {
        match self {
            DropOutcome::Accepted(event) => Some(event),
            DropOutcome::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate<K> {
    target: Option<K>,
    kind: DragDropKind,
    position: DropPosition,
}

/// Per-gesture drag-and-drop state for one view.
///
/// Holds no state across gestures: [`enter`](Self::enter) always starts from
/// cleared feedback.
#[derive(Debug)]
pub struct DropNegotiator<K> {
    last: Option<Candidate<K>>,
    feedback: DropFeedback<K>,
    active: bool,
    evaluations: usize,
}

impl<K> Default for DropNegotiator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DropNegotiator<K> {
    /// Creates an idle negotiator.
    pub fn new() -> Self {
        Self {
            last: None,
            feedback: DropFeedback::cleared(),
            active: false,
            evaluations: 0,
        }
    }

    /// Returns `true` between [`enter`](Self::enter) and the end of the gesture.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The current feedback.
    pub fn feedback(&self) -> &DropFeedback<K> {
        &self.feedback
    }

    /// How many times the model has been asked during this gesture.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations
    }

    fn reset(&mut self) {
        self.last = None;
        self.feedback = DropFeedback::cleared();
        self.evaluations = 0;
    }

    /// Starts a gesture, clearing whatever the previous one left behind.
    pub fn enter(&mut self) {
        self.reset();
        self.active = true;
        tracing::trace!(target: targets::DRAG_DROP, "drag entered");
    }

    /// The cursor left the view. Feedback is cleared; the gesture goes on.
    pub fn leave(&mut self) {
        self.last = None;
        self.feedback = DropFeedback::cleared();
        tracing::trace!(target: targets::DRAG_DROP, "drag left");
    }

    /// Aborts the gesture (escape, focus loss).
    pub fn cancel(&mut self) {
        self.reset();
        self.active = false;
        tracing::debug!(target: targets::DRAG_DROP, "drag cancelled");
    }
}

impl<K: Clone + PartialEq + std::fmt::Debug> DropNegotiator<K> {
    /// Re-negotiates for a cursor over `target` at `position`.
    ///
    /// The model is only asked again when the target, the requested kind or
    /// the position differs from the previous call.
    pub fn drag_over<T>(
        &mut self,
        target: Option<K>,
        position: DropPosition,
        modifiers: Modifiers,
        payload: &DragPayload<T>,
        drop_target: &dyn DropTarget<K, T>,
    ) -> &DropFeedback<K> {
        if !self.active {
            self.enter();
        }
        let candidate = Candidate {
            target,
            kind: requested_kind(modifiers, payload.allowed()),
            position,
        };
        if self.last.as_ref() == Some(&candidate) {
            return &self.feedback;
        }

        let _span = tracing::trace_span!(target: targets::DRAG_DROP, span_names::NEGOTIATE).entered();
        self.feedback = match &candidate.target {
            Some(target) if candidate.kind.is_accepted() => {
                self.evaluations += 1;
                let accepted = drop_target.can_accept_drop(target, payload, candidate.kind, position);
                if accepted.is_accepted() && payload.allowed().allows(accepted) {
                    DropFeedback::accepted(accepted, target, position)
                } else {
                    DropFeedback::cleared()
                }
            }
            _ => DropFeedback::cleared(),
        };
        tracing::trace!(
            target: targets::DRAG_DROP,
            target_item = ?candidate.target,
            requested = ?candidate.kind,
            ?position,
            effect = ?self.feedback.effect,
            "drop negotiated"
        );
        self.last = Some(candidate);
        &self.feedback
    }

    /// Finishes the gesture by asking the model to perform the drop at the
    /// last negotiated target.
    ///
    /// A drop the last drag-over rejected is not offered to the model. Model
    /// failures are logged and reported as [`DropOutcome::Rejected`].
    pub fn complete_drop<T>(
        &mut self,
        payload: &DragPayload<T>,
        drop_target: &dyn DropTarget<K, T>,
    ) -> DropOutcome<K, T> {
        let effect = self.feedback.effect;
        let last = self.last.take();
        self.reset();
        self.active = false;

        let Some(Candidate {
            target: Some(target),
            position,
            ..
        }) = last
        else {
            return DropOutcome::Rejected;
        };
        if !effect.is_accepted() {
            return DropOutcome::Rejected;
        }

        let performed = drop_target
            .accept_drop(&target, payload, effect, position)
            .and_then(|kind| {
                if kind.is_accepted() && payload.allowed().allows(kind) {
                    Ok(kind)
                } else {
                    Err(BindingError::DropRejected)
                }
            });
        match performed {
            Ok(kind) => {
                tracing::debug!(target: targets::DRAG_DROP, target_item = ?target, ?kind, ?position, "drop accepted");
                DropOutcome::Accepted(DropEvent {
                    target,
                    position,
                    kind,
                    payload: payload.clone(),
                })
            }
            Err(BindingError::DropRejected) => {
                tracing::debug!(target: targets::DRAG_DROP, target_item = ?target, "drop rejected");
                DropOutcome::Rejected
            }
            Err(err) => {
                tracing::warn!(target: targets::DRAG_DROP, target_item = ?target, error = %err, "drop failed");
                DropOutcome::Rejected
            }
        }
    }
}
