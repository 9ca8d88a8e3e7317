use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free cyclic dispenser over a fixed, non-empty array.
///
/// `next()` atomically increments an internal counter and returns the item
/// at `counter mod len`. The counter wraps on overflow by construction: it is
/// taken modulo `len`, so wrapping `usize::MAX` back to `0` never produces an
/// out-of-bounds index.
#[derive(Debug)]
pub struct RoundRobinRotator<T> {
    items: Box<[T]>,
    index: AtomicUsize,
}

impl<T> RoundRobinRotator<T> {
    /// Fails if `items` is empty; a rotator with no entries cannot serve `next()`.
    pub fn new(items: Vec<T>) -> Result<Self, EmptyRotatorError> {
        if items.is_empty() {
            return Err(EmptyRotatorError);
        }
        Ok(Self {
            items: items.into_boxed_slice(),
            index: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn next(&self) -> &T {
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        &self.items[i % self.items.len()]
    }
}

#[derive(Debug, thiserror::Error)]
#[error("rotator requires at least one item")]
pub struct EmptyRotatorError;

/// A rotator over proxy entries that degrades to "no rotator" rather than
/// panicking when the configured proxy list is empty.
#[derive(Debug)]
pub struct ProxyRotator<T>(Option<RoundRobinRotator<T>>);

impl<T> ProxyRotator<T> {
    pub fn new(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        RoundRobinRotator::new(items).ok().map(|r| ProxyRotator(Some(r)))
    }

    /// Returns the next proxy, or `None` if no rotator was configured.
    pub fn next(&self) -> Option<&T> {
        self.0.as_ref().map(|r| r.next())
    }
}
