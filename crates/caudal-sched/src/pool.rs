//! Fixed-size worker thread pool fed through a channel.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A named pool of OS worker threads.
///
/// Jobs are queued on an unbounded channel and picked up by the next free
/// worker. Dropping the pool closes the queue and joins every worker, so all
/// submitted jobs run to completion before the pool is gone.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    max_threads: usize,
}

impl ThreadPool {
    /// Pool of `threads` workers (at least 1) named `{name}-{index}`.
    pub fn new(name: &str, threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..threads)
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("spawn pool worker thread")
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
            max_threads: threads,
        }
    }

    /// Pool sized to the machine's available parallelism.
    pub fn cpu_bound(name: &str) -> Self {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(name, threads)
    }

    /// Number of worker threads.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Queues `job` for execution on the next free worker.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            // receivers outlive the sender; send can only fail after drop
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
