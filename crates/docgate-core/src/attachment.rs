//! Typed, exchange-scoped attachments.
//!
//! Attachments let handlers pass data sideways without widening the
//! [`Exchange`](crate::Exchange) API. Each value is stored under an
//! [`AttachmentKey`], which pairs a name with the value type, so two keys with
//! the same name but different types never collide.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key into the attachment map.
///
/// Keys are usually declared as constants next to the code that owns them.
///
/// ```
/// use docgate_core::AttachmentKey;
///
/// const RETRIES: AttachmentKey<u32> = AttachmentKey::new("retries");
/// assert_eq!(RETRIES.name(), "retries");
/// ```
pub struct AttachmentKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttachmentKey<T> {
    /// Creates a new key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttachmentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttachmentKey<T> {}

impl<T> fmt::Debug for AttachmentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentKey")
            .field("name", &self.name)
            .finish()
    }
}

type Slot = (&'static str, TypeId);

/// The attachment map carried by an exchange.
///
/// Values are reference counted, so a cloned map (and therefore a detached
/// copy of an exchange) observes the same values without copying them.
#[derive(Clone, Default)]
pub struct Attachments {
    values: HashMap<Slot, Arc<dyn Any + Send + Sync>>,
}

impl Attachments {
    /// Creates an empty attachment map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: 'static>(key: AttachmentKey<T>) -> Slot {
        (key.name, TypeId::of::<T>())
    }

    /// Stores a value, replacing any previous one.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: AttachmentKey<T>, value: T) {
        self.values.insert(Self::slot(key), Arc::new(value));
    }

    /// Stores a value only if the key is not yet present.
    ///
    /// Returns true if the value was stored.
    pub fn insert_if_absent<T: Send + Sync + 'static>(
        &mut self,
        key: AttachmentKey<T>,
        value: T,
    ) -> bool {
        let slot = Self::slot(key);
        if self.values.contains_key(&slot) {
            return false;
        }
        self.values.insert(slot, Arc::new(value));
        true
    }

    /// Returns the value stored under the key.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: AttachmentKey<T>) -> Option<&T> {
        self.values
            .get(&Self::slot(key))
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns true if a value is stored under the key.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self, key: AttachmentKey<T>) -> bool {
        self.values.contains_key(&Self::slot(key))
    }

    /// Removes the value stored under the key.
    ///
    /// Returns the removed value when no other copy of the map still shares it.
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: AttachmentKey<T>) -> Option<T> {
        let value = self.values.remove(&Self::slot(key))?;
        value
            .downcast::<T>()
            .ok()
            .and_then(|value| Arc::try_unwrap(value).ok())
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no value is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("Attachments").field("keys", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: AttachmentKey<u32> = AttachmentKey::new("count");
    const COUNT_AS_TEXT: AttachmentKey<String> = AttachmentKey::new("count");

    #[test]
    fn test_insert_and_get() {
        let mut attachments = Attachments::new();
        attachments.insert(COUNT, 3);
        assert_eq!(attachments.get(COUNT), Some(&3));
        assert!(attachments.contains(COUNT));
    }

    #[test]
    fn test_same_name_different_type_do_not_collide() {
        let mut attachments = Attachments::new();
        attachments.insert(COUNT, 3);
        attachments.insert(COUNT_AS_TEXT, "three".to_string());
        assert_eq!(attachments.get(COUNT), Some(&3));
        assert_eq!(attachments.get(COUNT_AS_TEXT).map(String::as_str), Some("three"));
        assert_eq!(attachments.len(), 2);
    }

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let mut attachments = Attachments::new();
        assert!(attachments.insert_if_absent(COUNT, 1));
        assert!(!attachments.insert_if_absent(COUNT, 2));
        assert_eq!(attachments.get(COUNT), Some(&1));
    }

    #[test]
    fn test_clone_shares_values() {
        let mut attachments = Attachments::new();
        attachments.insert(COUNT, 7);
        let copy = attachments.clone();
        assert_eq!(copy.get(COUNT), Some(&7));

        // A shared value cannot be moved out while the copy holds it.
        assert_eq!(attachments.remove(COUNT), None);
        assert!(!attachments.contains(COUNT));
        assert_eq!(copy.get(COUNT), Some(&7));
    }

    #[test]
    fn test_remove_unshared() {
        let mut attachments = Attachments::new();
        attachments.insert(COUNT, 9);
        assert_eq!(attachments.remove(COUNT), Some(9));
        assert!(attachments.is_empty());
    }
}
