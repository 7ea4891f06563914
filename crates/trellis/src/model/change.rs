//! Change notifications for item sequences.

/// A structural change to an [`ItemCollection`](super::ItemCollection).
///
/// The set of kinds is closed; consumers match it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemChange {
    /// An item was appended at this index.
    Added(usize),
    /// The item at this index was updated in place.
    Changed(usize),
    /// The item formerly at this index was removed.
    Removed(usize),
    /// An item was inserted before the item previously at this index.
    Inserted(usize),
    /// The sequence changed in ways that cannot be described positionally.
    Reset,
}

impl ItemChange {
    /// The index the change refers to, if it is positional.
    pub fn index(&self) -> Option<usize> {
        match *self {
            ItemChange::Added(i)
            | ItemChange::Changed(i)
            | ItemChange::Removed(i)
            | ItemChange::Inserted(i) => Some(i),
            ItemChange::Reset => None,
        }
    }

    /// Returns `true` for [`ItemChange::Reset`].
    pub fn is_reset(&self) -> bool {
        matches!(self, ItemChange::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_index() {
        assert_eq!(ItemChange::Added(3).index(), Some(3));
        assert_eq!(ItemChange::Inserted(0).index(), Some(0));
        assert_eq!(ItemChange::Reset.index(), None);
        assert!(ItemChange::Reset.is_reset());
        assert!(!ItemChange::Removed(1).is_reset());
    }
}
