//! Drag-and-drop vocabulary shared by domain models and views.
//!
//! Domain models answer drop requests in these terms; the negotiator in
//! [`crate::view::drag_drop`] turns pointer state into them.

use std::sync::Arc;

/// The action a drop performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DragDropKind {
    /// Nothing; the drop is rejected.
    #[default]
    None,
    /// Move the payload.
    Move,
    /// Copy the payload.
    Copy,
    /// Link to the payload.
    Link,
}

impl DragDropKind {
    /// Returns `true` for anything but [`DragDropKind::None`].
    pub fn is_accepted(self) -> bool {
        self != DragDropKind::None
    }

    /// The effect flag for this kind.
    pub fn effect(self) -> DropEffects {
        match self {
            DragDropKind::None => DropEffects::NONE,
            DragDropKind::Move => DropEffects::MOVE,
            DragDropKind::Copy => DropEffects::COPY,
            DragDropKind::Link => DropEffects::LINK,
        }
    }
}

/// A set of drop kinds a drag source allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DropEffects(u8);

impl DropEffects {
    /// No kinds allowed.
    pub const NONE: Self = Self(0);
    /// Move allowed.
    pub const MOVE: Self = Self(1 << 0);
    /// Copy allowed.
    pub const COPY: Self = Self(1 << 1);
    /// Link allowed.
    pub const LINK: Self = Self(1 << 2);
    /// Every kind allowed.
    pub const ALL: Self = Self(Self::MOVE.0 | Self::COPY.0 | Self::LINK.0);

    /// Returns `true` if every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if `kind` is allowed. [`DragDropKind::None`] always is.
    pub fn allows(self, kind: DragDropKind) -> bool {
        self.contains(kind.effect())
    }

    /// Returns `true` if no kind is allowed.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DropEffects {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for DropEffects {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::BitOrAssign for DropEffects {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Where a drop lands relative to its target item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DropPosition {
    /// Onto the item itself.
    #[default]
    On,
    /// Immediately before the item.
    Before,
    /// Immediately after the item.
    After,
}

/// The items being dragged and the kinds the source allows.
///
/// A payload lives for one drag gesture. Cloning is cheap.
#[derive(Debug)]
pub struct DragPayload<T> {
    items: Arc<[T]>,
    allowed: DropEffects,
}

impl<T> Clone for DragPayload<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            allowed: self.allowed,
        }
    }
}

impl<T> DragPayload<T> {
    /// Creates a payload.
    pub fn new(items: impl Into<Arc<[T]>>, allowed: DropEffects) -> Self {
        Self {
            items: items.into(),
            allowed,
        }
    }

    /// The dragged items.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The first dragged item.
    pub fn item(&self) -> Option<&T> {
        self.items.first()
    }

    /// Kinds the source allows.
    pub fn allowed(&self) -> DropEffects {
        self.allowed
    }

    /// Returns `true` if both payloads carry the same items.
    pub fn same_items(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}
