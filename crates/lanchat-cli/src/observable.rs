//! Observable collections for the presentation layer.

use tokio::sync::watch;

/// A value that is replaced whole and whose changes can be awaited.
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            tx: watch::Sender::new(value),
        }
    }

    /// Swap in a new value. Subscribers never see a partial update.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Default> Observable<T> {
    pub fn clear(&self) {
        self.replace(T::default());
    }
}

impl<T: Clone> Observable<T> {
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }
}
