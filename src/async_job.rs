//! Background task handle that a front end can poll without blocking.

use anyhow::{anyhow, Result};
use std::future::Future;
use tokio::sync::oneshot::{self, error::TryRecvError, Receiver};

/// Polls the result of a task spawned on the tokio runtime.
pub struct AsyncJob<T> {
    receiver: Option<Receiver<Result<T>>>,
}

impl<T: Send + 'static> AsyncJob<T> {
    /// Spawn `future` on the current runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(future.await);
        });
        Self::new(rx)
    }
}

impl<T> AsyncJob<T> {
    pub fn new(receiver: Receiver<Result<T>>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    /// `Some(result)` once the job has finished, `None` while it runs.
    pub fn poll(&mut self) -> Option<Result<T>> {
        let rx = self.receiver.as_mut()?;
        match rx.try_recv() {
            Ok(res) => {
                self.receiver = None;
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                self.receiver = None;
                Some(Err(anyhow!("Worker task disconnected")))
            }
        }
    }

    /// Wait for the result. A job that already returned its result yields an
    /// error. Dropping the returned future leaves the job pollable.
    pub async fn wait(&mut self) -> Result<T> {
        let rx = self
            .receiver
            .as_mut()
            .ok_or_else(|| anyhow!("Job already finished"))?;
        let outcome = rx.await;
        self.receiver = None;
        outcome.map_err(|_| anyhow!("Worker task disconnected"))?
    }

    pub fn is_running(&self) -> bool {
        self.receiver.is_some()
    }
}
