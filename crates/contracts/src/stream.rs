//! Hot state streams
//!
//! A [`StateCell`] holds the latest value of some piece of state, or nothing until the
//! first value is published. Every [`StateStream`] subscribed to a cell replays the
//! latest value first and then follows changes, so late subscribers never miss the
//! current state. Publishing an equal value does not wake subscribers.
//!
//! Derived streams ([`StateStream::map`], [`StateStream::combine`]) run on a spawned
//! tokio task which stops once every subscriber of the derived stream is dropped.
//! Dropping a stream is the only way to unsubscribe.

use std::fmt;

use tokio::sync::watch;

/// Writable side of a state stream
pub struct StateCell<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cell without a value; subscribers wait for the first `set`
    pub fn empty() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(Some(value));
        Self { tx }
    }

    /// Publish `value`
    ///
    /// Returns false (and wakes nobody) when the value equals the current one.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(move |current| {
            if current.as_ref() == Some(&value) {
                false
            } else {
                *current = Some(value);
                true
            }
        })
    }

    /// Modify the current value in place, publishing only if it changed
    ///
    /// `f` receives `None` when the cell is still empty.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(Option<&T>) -> T,
    {
        self.tx.send_if_modified(move |current| {
            let next = f(current.as_ref());
            if current.as_ref() == Some(&next) {
                false
            } else {
                *current = Some(next);
                true
            }
        })
    }

    /// Latest value, if any
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Subscribe, replaying the latest value
    pub fn subscribe(&self) -> StateStream<T> {
        StateStream::from_receiver(self.tx.subscribe())
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Resolves once every subscriber has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl<T> fmt::Debug for StateCell<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("value", &*self.tx.borrow())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// Readable side of a state stream
pub struct StateStream<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T> StateStream<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from_receiver(mut rx: watch::Receiver<Option<T>>) -> Self {
        // Replay-of-latest: the current value counts as unseen.
        rx.mark_changed();
        Self { rx }
    }

    /// A stream that emits `value` once and then ends
    pub fn just(value: T) -> Self {
        StateCell::new(value).subscribe()
    }

    /// Latest value without waiting
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next unseen value
    ///
    /// The first call returns the current value immediately if one exists.
    /// Returns `None` once the cell is gone and every value has been seen.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Derive a stream by applying `f` to every value
    ///
    /// Must be called inside a tokio runtime.
    pub fn map<U, F>(self, mut f: F) -> StateStream<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let cell = StateCell::empty();
        let output = cell.subscribe();
        let mut input = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cell.closed() => break,
                    next = input.next() => match next {
                        Some(value) => {
                            cell.set(f(value));
                        }
                        None => {
                            // Upstream finished: hold the last value until nobody listens.
                            cell.closed().await;
                            break;
                        }
                    },
                }
            }
        });

        output
    }

    /// Combine with another stream, emitting once both have produced a value
    ///
    /// Must be called inside a tokio runtime.
    pub fn combine<U, V, F>(self, other: StateStream<U>, mut f: F) -> StateStream<V>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        V: Clone + PartialEq + Send + Sync + 'static,
        F: FnMut(&T, &U) -> V + Send + 'static,
    {
        let cell = StateCell::empty();
        let output = cell.subscribe();
        let mut left = self;
        let mut right = other;

        tokio::spawn(async move {
            let mut left_value: Option<T> = None;
            let mut right_value: Option<U> = None;
            let mut left_done = false;
            let mut right_done = false;

            loop {
                if left_done && right_done {
                    cell.closed().await;
                    break;
                }
                tokio::select! {
                    _ = cell.closed() => break,
                    next = left.next(), if !left_done => match next {
                        Some(value) => left_value = Some(value),
                        None => left_done = true,
                    },
                    next = right.next(), if !right_done => match next {
                        Some(value) => right_value = Some(value),
                        None => right_done = true,
                    },
                }
                if let (Some(l), Some(r)) = (&left_value, &right_value) {
                    cell.set(f(l, r));
                }
            }
        });

        output
    }
}

impl<T> Clone for StateStream<T> {
    fn clone(&self) -> Self {
        let mut rx = self.rx.clone();
        rx.mark_changed();
        Self { rx }
    }
}

impl<T> fmt::Debug for StateStream<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStream")
            .field("latest", &*self.rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_new_subscriber_replays_latest() {
        let cell = StateCell::new(1);
        cell.set(2);

        let mut stream = cell.subscribe();
        assert_eq!(stream.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_empty_cell_waits_for_first_value() {
        let cell: StateCell<u32> = StateCell::empty();
        let mut stream = cell.subscribe();

        assert!(timeout(Duration::from_millis(20), stream.next())
            .await
            .is_err());

        cell.set(7);
        assert_eq!(stream.next().await, Some(7));
    }

    #[tokio::test]
    async fn test_equal_value_does_not_wake() {
        let cell = StateCell::new("open");
        let mut stream = cell.subscribe();
        assert_eq!(stream.next().await, Some("open"));

        assert!(!cell.set("open"));
        assert!(timeout(Duration::from_millis(20), stream.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_when_cell_dropped() {
        let cell = StateCell::new(3);
        let mut stream = cell.subscribe();
        drop(cell);

        assert_eq!(stream.next().await, Some(3));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_map_follows_source() {
        let cell = StateCell::new(2);
        let mut doubled = cell.subscribe().map(|v| v * 2);

        assert_eq!(doubled.next().await, Some(4));
        cell.set(5);
        assert_eq!(doubled.next().await, Some(10));
    }

    #[tokio::test]
    async fn test_combine_waits_for_both_sides() {
        let left = StateCell::new(1);
        let right: StateCell<i32> = StateCell::empty();
        let mut sum = left.subscribe().combine(right.subscribe(), |l, r| l + r);

        assert!(timeout(Duration::from_millis(20), sum.next()).await.is_err());

        right.set(10);
        assert_eq!(sum.next().await, Some(11));

        left.set(5);
        assert_eq!(sum.next().await, Some(15));
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let cell: StateCell<Vec<u8>> = StateCell::empty();
        cell.update(|current| {
            let mut next = current.cloned().unwrap_or_default();
            next.push(1);
            next
        });
        assert_eq!(cell.get(), Some(vec![1]));
    }
}
