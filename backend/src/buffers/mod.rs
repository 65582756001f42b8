// Single-slot buffers shared between the relay loop and the front-end bridge.

/// Holds at most one pending item; a newer push always replaces an older one.
#[derive(Debug)]
pub struct LatestSlot<T> {
    pending: Option<T>,
    last_served: Option<T>,
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            pending: None,
            last_served: None,
        }
    }

    /// Stores `item`, returning true when an unconsumed item was discarded.
    pub fn push(&mut self, item: T) -> bool {
        self.pending.replace(item).is_some()
    }

    /// Removes the pending item without touching the repeat memory.
    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Pops the pending item. With nothing pending, the last served item is
    /// handed out one more time and then forgotten.
    pub fn serve(&mut self) -> Option<T> {
        if let Some(item) = self.pending.take() {
            self.last_served = Some(item.clone());
            return Some(item);
        }
        self.last_served.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn forget_served(&mut self) {
        self.last_served = None;
    }
}

impl<T: Clone> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
