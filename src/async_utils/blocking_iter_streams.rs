//! Turn blocking iterators (like [`crate::page_iter::PageIter`], which reads
//! and decodes image files) into async streams that run each `next()` on
//! Tokio's blocking thread pool.

use std::{
    panic,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{FutureExt as _, Stream};

use super::BoxedFuture;
use crate::prelude::*;

/// Either we hold the iterator, or a blocking task does.
enum State<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    Idle(I),
    Running(BoxedFuture<(Option<Result<T>>, I)>),
}

/// A [`Stream`] wrapping a blocking iterator.
pub struct BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    /// Only `None` while `poll_next` is running.
    state: Option<State<I, T>>,
}

impl<I, T> BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    /// Wrap an iterator.
    pub fn new(iter: I) -> Self {
        Self {
            state: Some(State::Idle(iter)),
        }
    }
}

impl<I, T> Stream for BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    type Item = I::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        let mut future = match this
            .state
            .take()
            .expect("BlockingIterStream state missing on entry to poll_next")
        {
            // Hand the iterator to a blocking task, which gives it back with
            // the next item.
            State::Idle(mut iter) => spawn_blocking_propagating_panics(move || {
                let next = iter.next();
                (next, iter)
            })
            .boxed(),
            State::Running(future) => future,
        };

        match future.poll_unpin(cx) {
            Poll::Ready((next, iter)) => {
                this.state = Some(State::Idle(iter));
                Poll::Ready(next)
            }
            Poll::Pending => {
                this.state = Some(State::Running(future));
                Poll::Pending
            }
        }
    }
}

/// Run a closure on Tokio's blocking pool, re-raising any panic in the caller.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        Err(err) => panic!("blocking task was cancelled: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt as _;

    use super::*;

    #[tokio::test]
    async fn yields_items_in_order() {
        let iter = (0..5).map(Ok::<_, anyhow::Error>);
        let items = BlockingIterStream::new(iter)
            .map(|item| item.unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let iter = vec![Ok(1), Err(anyhow!("bad page")), Ok(3)].into_iter();
        let items = BlockingIterStream::new(iter).collect::<Vec<_>>().await;
        assert_eq!(items.len(), 3);
        assert!(items[1].is_err());
    }
}
