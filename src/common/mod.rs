use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::thread;
use std::thread::JoinHandle;

/// Background thread with its own termination channel.
#[derive(Debug)]
pub struct Worker {
    pub join_handle: JoinHandle<()>,
    pub terminate_worker_tx: Sender<()>,
}

impl Worker {
    /// Asks the worker to stop. The worker may have already finished on its own.
    pub fn terminate(&self) {
        if self.terminate_worker_tx.send(()).is_err() {
            debug!("Worker already stopped, termination signal dropped");
        }
    }

    pub fn join(self) {
        if self.join_handle.join().is_err() {
            error!("Worker panicked")
        }
    }

    pub fn terminate_and_join(self) {
        self.terminate();
        self.join();
    }
}

pub fn run_worker<T, F>(worker: F, params: T) -> Worker
where
    T: Send + 'static,
    F: FnOnce(T, Receiver<()>) + Send + 'static,
{
    let (terminate_worker_tx, terminate_worker_rx): (Sender<()>, Receiver<()>) =
        crossbeam_channel::unbounded();

    let join_handle = thread::spawn(move || worker(params, terminate_worker_rx));

    Worker {
        join_handle,
        terminate_worker_tx,
    }
}

/// Non-blocking check of a termination channel. A disconnected channel counts as a request.
pub fn termination_requested(terminate_worker_rx: &Receiver<()>) -> bool {
    match terminate_worker_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}
