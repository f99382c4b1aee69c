use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::core::Core;

/// A unit of work against the datastore state. `FnOnce` makes double
/// completion unrepresentable: a job's reply channel is consumed when the
/// job runs.
pub(crate) type Job = Box<dyn FnOnce(&mut Core) + Send + 'static>;

pub(crate) enum Message {
    Task { forced: bool, job: Job },
    DrainBuffer,
    Shutdown,
}

/// The single consumer that serializes every datastore operation.
///
/// The worker starts in one of two states. **Buffering** (used when a data
/// file must be loaded first): incoming jobs accumulate in a queue, except
/// jobs submitted with the `forced` flag (the load itself), which run
/// immediately. After a successful load, [`DrainHandle::signal`] replays
/// the buffered jobs in submission order and switches to **running**, where
/// every job executes as it arrives.
pub(crate) struct Executor {
    sender: Sender<Message>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Executor {
    pub fn start(core: Core, buffering: bool) -> Executor {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("quill-executor".to_string())
            .spawn(move || run_loop(core, receiver, buffering))
            .expect("failed to spawn the executor thread");
        Executor {
            sender,
            worker: Some(worker),
        }
    }

    pub fn submit(&self, forced: bool, job: Job) {
        let _ = self.sender.send(Message::Task { forced, job });
    }

    /// A handle the load task uses to drain the startup buffer once the
    /// database is in memory.
    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle {
            sender: self.sender.clone(),
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

pub(crate) struct DrainHandle {
    sender: Sender<Message>,
}

impl DrainHandle {
    pub fn signal(self) {
        let _ = self.sender.send(Message::DrainBuffer);
    }
}

fn run_loop(mut core: Core, receiver: Receiver<Message>, mut buffering: bool) {
    let mut buffer: VecDeque<Job> = VecDeque::new();
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Task { forced, job } => {
                if buffering && !forced {
                    buffer.push_back(job);
                } else {
                    job(&mut core);
                }
            }
            Message::DrainBuffer => {
                buffering = false;
                while let Some(job) = buffer.pop_front() {
                    job(&mut core);
                }
            }
            Message::Shutdown => break,
        }
    }
}

/// The pending result of a job submitted without blocking.
pub struct Ticket<T> {
    receiver: Receiver<T>,
}

impl<T> Ticket<T> {
    pub(crate) fn new(receiver: Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Block until the job has run. Panics only if the executor thread died,
    /// which means a prior job panicked.
    pub fn wait(self) -> T {
        self.receiver
            .recv()
            .expect("the datastore executor stopped before completing this operation")
    }

    /// Take the result if the job has already run, or get the ticket back.
    pub fn try_wait(self) -> Result<T, Ticket<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(value),
            Err(_) => Err(self),
        }
    }
}
