//! Ordered single-worker task queue.
//!
//! `submit` is non-blocking and safe from any thread. One worker task drains
//! the queue and awaits each handler to completion before taking the next,
//! so handlers never overlap and run in submission order.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum Job<T> {
    Run(T),
    Stop,
}

pub struct WorkQueue<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Job<T>>,
    // Guards the send so nothing can slip in behind the stop marker.
    closed: Arc<Mutex<bool>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Spawns the worker. Must be called inside a Tokio runtime.
    pub fn start<F, Fut>(name: &'static str, mut handler: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<T>>();
        let worker = tokio::spawn(async move {
            tracing::debug!(queue = name, "worker started");
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Run(item) => handler(item).await,
                    Job::Stop => break,
                }
            }
            tracing::debug!(queue = name, "worker stopped");
        });
        let queue = Self { name, tx, closed: Arc::new(Mutex::new(false)) };
        (queue, worker)
    }

    /// Enqueues `item`. On rejection the item is dropped here and never handled.
    pub fn submit(&self, item: T) -> crate::Result<()> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            tracing::warn!(queue = self.name, "submit after close");
            return Err(crate::Error::QueueClosed);
        }
        self.tx.send(Job::Run(item)).map_err(|_| {
            tracing::warn!(queue = self.name, "worker is gone");
            crate::Error::QueueClosed
        })
    }

    /// Rejects further submissions. Already queued items still run, then the worker exits.
    pub fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*closed {
            *closed = true;
            let _ = self.tx.send(Job::Stop);
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
