//! A lazy, replayable async stream.
//!
//! [`LazyStream`] wraps a single-pass producer. The first iteration drives
//! the producer and caches every item; later iterations read the cache. A
//! producer error is stored too: replays yield the cached items and then the
//! same error again.
//!
//! Combinators build new `LazyStream`s over [`LazyStream::iter`] and pull
//! nothing until the result is itself iterated.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use std::future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Error;

struct Shared<T, E> {
    source: Option<BoxStream<'static, Result<T, E>>>,
    cache: Vec<T>,
    error: Option<E>,
    completed: bool,
}

enum Step<T, E> {
    Item(T),
    Fail(E),
    End,
}

impl<T: Clone, E: Clone> Shared<T, E> {
    /// Produce the item at `index`, pulling from the source if the cache
    /// does not reach that far yet.
    async fn step(&mut self, index: usize) -> Step<T, E> {
        if let Some(item) = self.cache.get(index) {
            return Step::Item(item.clone());
        }
        if self.completed {
            return match &self.error {
                Some(e) => Step::Fail(e.clone()),
                None => Step::End,
            };
        }
        let Some(source) = self.source.as_mut() else {
            self.completed = true;
            return Step::End;
        };
        match source.next().await {
            Some(Ok(item)) => {
                self.cache.push(item.clone());
                Step::Item(item)
            }
            Some(Err(e)) => {
                self.error = Some(e.clone());
                self.finish();
                Step::Fail(e)
            }
            None => {
                self.finish();
                Step::End
            }
        }
    }

    fn finish(&mut self) {
        self.completed = true;
        self.source = None;
    }
}

/// One-pass-then-replay async sequence.
///
/// Cloning a `LazyStream` shares the producer and the cache.
pub struct LazyStream<T, E = Error> {
    shared: Arc<Mutex<Shared<T, E>>>,
}

impl<T, E> Clone for LazyStream<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> std::fmt::Debug for LazyStream<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyStream").finish_non_exhaustive()
    }
}

impl<T, E> LazyStream<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                source: Some(source.boxed()),
                cache: Vec::new(),
                error: None,
                completed: false,
            })),
        }
    }

    /// A stream over already-known items.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(items.into_iter().map(Ok)))
    }

    /// A fresh cursor. The first cursor to reach an uncached position pulls
    /// it from the producer; every other cursor reads it from the cache.
    pub fn iter(&self) -> BoxStream<'static, Result<T, E>> {
        let shared = Arc::clone(&self.shared);
        stream::unfold(Some((shared, 0usize)), |state| async move {
            let (shared, index) = state?;
            let step = {
                let mut inner = shared.lock().await;
                inner.step(index).await
            };
            match step {
                Step::Item(item) => Some((Ok(item), Some((shared, index + 1)))),
                Step::Fail(e) => Some((Err(e), None)),
                Step::End => None,
            }
        })
        .boxed()
    }

    // --- Combinators (lazy) ---

    pub fn map<U, F>(&self, mut f: F) -> LazyStream<U, E>
    where
        U: Clone + Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        LazyStream::new(self.iter().map(move |r| r.map(&mut f)))
    }

    pub fn filter<F>(&self, mut predicate: F) -> LazyStream<T, E>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        LazyStream::new(self.iter().filter(move |r| {
            future::ready(match r {
                Ok(item) => predicate(item),
                Err(_) => true,
            })
        }))
    }

    /// Call `f` on each item as it passes through.
    pub fn tap<F>(&self, mut f: F) -> LazyStream<T, E>
    where
        F: FnMut(&T) + Send + 'static,
    {
        LazyStream::new(self.iter().inspect(move |r| {
            if let Ok(item) = r {
                f(item);
            }
        }))
    }

    pub fn take(&self, n: usize) -> LazyStream<T, E> {
        LazyStream::new(self.iter().take(n))
    }

    pub fn take_while<F>(&self, mut predicate: F) -> LazyStream<T, E>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        LazyStream::new(self.iter().take_while(move |r| {
            future::ready(match r {
                Ok(item) => predicate(item),
                Err(_) => true,
            })
        }))
    }

    pub fn skip(&self, n: usize) -> LazyStream<T, E> {
        LazyStream::new(self.iter().skip(n))
    }

    /// Group items into vectors of `size` (the last may be shorter).
    /// A zero size is treated as one.
    pub fn chunk(&self, size: usize) -> LazyStream<Vec<T>, E> {
        LazyStream::new(self.iter().try_chunks(size.max(1)).map_err(|e| e.1))
    }

    pub fn enumerate(&self) -> LazyStream<(usize, T), E> {
        LazyStream::new(self.iter().enumerate().map(|(i, r)| r.map(|item| (i, item))))
    }

    // --- Terminal consumers ---

    pub async fn foreach<F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(T),
    {
        let mut cursor = self.iter();
        while let Some(item) = cursor.next().await {
            f(item?);
        }
        Ok(())
    }

    pub async fn reduce<A, F>(&self, init: A, mut f: F) -> Result<A, E>
    where
        F: FnMut(A, T) -> A,
    {
        let mut acc = init;
        let mut cursor = self.iter();
        while let Some(item) = cursor.next().await {
            acc = f(acc, item?);
        }
        Ok(acc)
    }

    /// Every item, in order.
    pub async fn all(&self) -> Result<Vec<T>, E> {
        self.iter().try_collect().await
    }

    // --- Introspection ---

    /// Whether the producer has been exhausted or has failed.
    pub async fn is_completed(&self) -> bool {
        self.shared.lock().await.completed
    }

    /// The error that ended the producer, if any.
    pub async fn error(&self) -> Option<E> {
        self.shared.lock().await.error.clone()
    }

    /// Number of items pulled from the producer so far.
    pub async fn items_count(&self) -> usize {
        self.shared.lock().await.cache.len()
    }
}
