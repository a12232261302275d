//! In-process stand-in for the durable experience queue.
//!
//! Behaves like the broker from the processor's point of view: deliveries
//! must be settled, and a requeued delivery comes back at the tail.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::PublishError;

use super::processor::{Delivery, Disposition, SettleError};
use super::publisher::EventSink;

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    ready: Mutex<VecDeque<(Vec<u8>, bool)>>,
    settled: Mutex<Vec<(Vec<u8>, Disposition)>>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, body: impl Into<Vec<u8>>) {
        self.inner.ready.lock().push_back((body.into(), false));
        self.inner.notify.notify_waiters();
    }

    /// Stop handing out deliveries once the ready list is drained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Bodies waiting to be delivered, oldest first.
    pub fn pending_bodies(&self) -> Vec<Vec<u8>> {
        self.inner.ready.lock().iter().map(|(b, _)| b.clone()).collect()
    }

    /// Every settlement so far, in order.
    pub fn settled(&self) -> Vec<(Vec<u8>, Disposition)> {
        self.inner.settled.lock().clone()
    }

    /// Consume deliveries; the stream ends after [`close`](Self::close) once
    /// nothing is left to deliver.
    pub fn consume(&self) -> BoxStream<'static, Result<MemoryDelivery, Infallible>> {
        stream::unfold(self.inner.clone(), |inner| async move {
            let delivery = next_delivery(&inner).await?;
            Some((Ok(delivery), inner))
        })
        .boxed()
    }
}

async fn next_delivery(inner: &Arc<Inner>) -> Option<MemoryDelivery> {
    loop {
        let notified = inner.notify.notified();
        let next = inner.ready.lock().pop_front();
        if let Some((body, redelivered)) = next {
            return Some(MemoryDelivery {
                body,
                redelivered,
                queue: inner.clone(),
            });
        }
        if inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        notified.await;
    }
}

#[async_trait]
impl EventSink for MemoryQueue {
    async fn send(&self, body: Vec<u8>) -> Result<(), PublishError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Broker("queue closed".to_string()));
        }
        self.push(body);
        Ok(())
    }
}

pub struct MemoryDelivery {
    body: Vec<u8>,
    redelivered: bool,
    queue: Arc<Inner>,
}

impl MemoryDelivery {
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn settle(self, disposition: Disposition) -> Result<(), SettleError> {
        self.queue
            .settled
            .lock()
            .push((self.body.clone(), disposition));
        if disposition == Disposition::Requeue {
            self.queue.ready.lock().push_back((self.body, true));
            self.queue.notify.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requeued_delivery_comes_back() {
        let queue = MemoryQueue::new();
        queue.push(b"a".to_vec());
        let mut deliveries = queue.consume();

        let first = deliveries.next().await.unwrap().unwrap();
        assert!(!first.redelivered());
        first.settle(Disposition::Requeue).await.unwrap();

        let again = deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.body(), b"a");
        assert!(again.redelivered());
        again.settle(Disposition::Ack).await.unwrap();

        queue.close();
        assert!(deliveries.next().await.is_none());
        assert_eq!(queue.settled().len(), 2);
    }

    #[tokio::test]
    async fn consumer_waits_for_push() {
        let queue = MemoryQueue::new();
        let mut deliveries = queue.consume();

        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.push(b"late".to_vec());
        });

        let delivery = deliveries.next().await.unwrap().unwrap();
        assert_eq!(delivery.body(), b"late");
    }
}
