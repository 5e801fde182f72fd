use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A value handed from one pipeline stage to the stages that depend on it.
///
/// The producer writes before it completes and consumers read after they
/// start, so the dependency graph orders every access. The lock is never
/// held across an await point.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.lock());
    }
}

impl<T: Clone> Shared<T> {
    pub fn get(&self) -> T {
        self.lock().clone()
    }
}

impl<T: Default> Shared<T> {
    pub fn take(&self) -> T {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_clones_share_value() {
        let producer: Shared<HashSet<String>> = Shared::default();
        let consumer = producer.clone();

        producer.update(|ids| {
            ids.insert("a".to_string());
        });

        assert!(consumer.get().contains("a"));
        assert_eq!(consumer.take().len(), 1);
        assert!(producer.get().is_empty());
    }
}
