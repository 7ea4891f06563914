//! The visible window over a row sequence.

/// Which rows of a list are on screen.
///
/// `first_visible` is the topmost wholly visible row and `capacity` the
/// number of rows that fit. The viewport never scrolls past the point where
/// the last row sits at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    first_visible: usize,
    capacity: usize,
    item_count: usize,
}

impl Viewport {
    /// Creates a viewport showing `capacity` rows of `item_count`, scrolled
    /// to the top.
    pub fn new(capacity: usize, item_count: usize) -> Self {
        Self {
            first_visible: 0,
            capacity,
            item_count,
        }
    }

    /// Topmost visible row.
    pub fn first_visible(&self) -> usize {
        self.first_visible
    }

    /// Rows that fit on screen.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows in the list.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Bottom-most visible row, or `None` if nothing is visible.
    pub fn last_visible(&self) -> Option<usize> {
        if self.capacity == 0 || self.first_visible >= self.item_count {
            return None;
        }
        Some((self.first_visible + self.capacity).min(self.item_count) - 1)
    }

    /// Largest valid `first_visible`.
    pub fn max_first(&self) -> usize {
        self.item_count.saturating_sub(self.capacity)
    }

    /// Returns `true` if `row` is on screen.
    pub fn is_displayed(&self, row: usize) -> bool {
        self.last_visible()
            .is_some_and(|last| row >= self.first_visible && row <= last)
    }

    /// Scrolls so that `row` is at the top, or as close as the end of the list
    /// allows. Returns `true` if the viewport moved.
    pub fn scroll_to(&mut self, row: usize) -> bool {
        let first = row.min(self.max_first());
        let moved = first != self.first_visible;
        self.first_visible = first;
        moved
    }

    /// Brings `row` on screen if it isn't already. Returns `true` if the
    /// viewport moved.
    ///
    /// The row goes to the top unless that would scroll past the end, in
    /// which case the viewport stops at [`max_first`](Self::max_first).
    /// Rows outside the list are ignored.
    pub fn ensure_visible(&mut self, row: usize) -> bool {
        if row >= self.item_count || self.is_displayed(row) {
            return false;
        }
        self.scroll_to(row)
    }

    /// Updates the row count, pulling the viewport back if it now scrolls
    /// past the end.
    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.first_visible = self.first_visible.min(self.max_first());
    }

    /// Updates the number of rows that fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.first_visible = self.first_visible.min(self.max_first());
    }
}
