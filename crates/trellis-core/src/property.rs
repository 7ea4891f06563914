//! Observable properties.
//!
//! A [`Property<T>`] is a lock-protected value with a built-in `changed`
//! signal. Views use properties for their host-facing flags (read-only mode,
//! drop-to-index permission, filter text) so a host can bind to them without
//! the view hand-rolling a signal per field.
//!
//! # Example
//!
//! ```
//! use trellis_core::Property;
//!
//! let read_only = Property::new(false);
//! read_only.changed.connect(|value| println!("read-only is now {value}"));
//!
//! assert!(read_only.set(true));   // changed, notifies
//! assert!(!read_only.set(true));  // unchanged, silent
//! ```

use std::fmt;

use parking_lot::RwLock;

use crate::logging::targets;
use crate::signal::Signal;

/// A value with change detection and notification.
///
/// `set` compares with `PartialEq` and only stores and notifies when the
/// value actually differs. The lock is released before `changed` fires, so
/// slots may read the property back.
pub struct Property<T: Clone + Send + 'static> {
    value: RwLock<T>,
    /// Fires with the new value after every effective change.
    pub changed: Signal<T>,
}

impl<T: Clone + Send + 'static> Property<T> {
    /// Create a property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            changed: Signal::new(),
        }
    }

    /// Clone out the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }

    /// Store a value without notifying.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }
}

impl<T: Clone + PartialEq + Send + 'static> Property<T> {
    /// Set the value. Returns `true` and fires `changed` if it differed.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Set the value, returning the previous one if it differed.
    pub fn replace(&self, value: T) -> Option<T> {
        let old = {
            let mut current = self.value.write();
            if *current == value {
                return None;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        tracing::trace!(target: targets::PROPERTY, "property changed");
        self.changed.emit(value);
        Some(old)
    }

    /// Apply `f` to a copy of the value and store the result through [`set`](Self::set).
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }
}

impl<T: Clone + Default + Send + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug + Send + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &*self.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_property_set_detects_change() {
        let prop = Property::new(42);
        assert!(!prop.set(42));
        assert!(prop.set(100));
        assert_eq!(prop.get(), 100);
    }

    #[test]
    fn test_property_notifies_only_on_change() {
        let prop = Property::new(String::from("a"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        prop.changed.connect(move |v: &String| seen_clone.lock().push(v.clone()));

        prop.set("a".into());
        prop.set("b".into());
        prop.set("b".into());
        prop.set_silent("c".into());

        assert_eq!(*seen.lock(), vec!["b".to_string()]);
        assert_eq!(prop.get(), "c");
    }

    #[test]
    fn test_property_replace() {
        let prop = Property::new(1);
        assert_eq!(prop.replace(1), None);
        assert_eq!(prop.replace(2), Some(1));
    }

    #[test]
    fn test_property_update() {
        let prop = Property::new(vec![1, 2]);
        assert!(prop.update(|v| v.push(3)));
        assert!(!prop.update(|_| {}));
        prop.with(|v| assert_eq!(v.len(), 3));
    }

    #[test]
    fn test_slot_can_read_back() {
        let prop = Arc::new(Property::new(0));
        let observed = Arc::new(Mutex::new(None));

        let prop_clone = prop.clone();
        let observed_clone = observed.clone();
        prop.changed.connect(move |_| {
            *observed_clone.lock() = Some(prop_clone.get());
        });

        prop.set(5);
        assert_eq!(*observed.lock(), Some(5));
    }
}
