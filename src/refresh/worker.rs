//! Dedicated single-job background workers.
//!
//! Each worker owns one named thread that runs jobs strictly in submission
//! order. Results are never written into shared state; the handler posts
//! them back to the control thread as messages.

use crossbeam_channel::{unbounded, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

pub struct Worker<J: Send + 'static> {
    name: String,
    sender: Option<Sender<J>>,
    handle: Option<JoinHandle<()>>,
}

impl<J: Send + 'static> Worker<J> {
    /// Start a worker thread that feeds every submitted job to `handler`
    pub fn spawn<F>(name: &str, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(J) + Send + 'static,
    {
        let (sender, receiver) = unbounded::<J>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                for job in receiver.iter() {
                    handler(job);
                }
                debug!(worker = %thread_name, "Worker stopped");
            })?;
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a job behind any the worker is already running.
    /// Returns false if the worker thread has gone away.
    pub fn submit(&self, job: J) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<J: Send + 'static> Drop for Worker<J> {
    fn drop(&mut self) {
        // Closing the channel ends the receive loop once queued jobs drain
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(worker = %self.name, "Worker thread panicked");
            }
        }
    }
}
