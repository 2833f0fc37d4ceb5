//! A work queue drained by pools of producer and consumer threads.
//!
//! Producers repeatedly ask a [`Processor`] for more work and push whatever it
//! returns onto a shared queue. Consumers pop items and hand them back to the
//! [`Processor`] one at a time. Stopping is graceful: producers stop pulling
//! first, then every consumer is sent one poison message, which sits behind
//! all the work already queued.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::debug;

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("{role} threads were already started")]
    AlreadyStarted { role: Role },
    #[error("failed to spawn {role} thread {tid}")]
    Spawn {
        role: Role,
        tid: usize,
        #[source]
        source: io::Error,
    },
    #[error("{role} thread {tid} panicked")]
    Panicked { role: Role, tid: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// the work a [`QueueProcessor`] runs
pub trait Processor: Send + Sync + 'static {
    type Item: Send + 'static;

    /// pull the next batch of work. must not block indefinitely.
    ///
    /// `None` halts the calling producer for good. an empty batch means
    /// nothing is available right now, and the producer sleeps for its
    /// throttle before asking again
    fn produce(&self, producer_tid: usize) -> Option<Vec<Self::Item>>;

    /// handle a single item
    fn consume(&self, consumer_tid: usize, item: Self::Item);
}

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// bound on queued items, 0 for no bound
    pub capacity: usize,
    pub producer_count: usize,
    /// how long a producer sleeps after an empty batch
    pub producer_throttle: Duration,
    pub consumer_count: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            producer_count: 1,
            producer_throttle: Duration::from_millis(100),
            consumer_count: 1,
        }
    }
}

enum Message<T> {
    Work(T),
    Poison,
}

struct ProducerHandle {
    tid: usize,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct ConsumerHandle {
    tid: usize,
    thread: Option<JoinHandle<()>>,
}

pub struct QueueProcessor<P: Processor> {
    processor: Arc<P>,
    config: ProcessorConfig,
    sender: Sender<Message<P::Item>>,
    receiver: Receiver<Message<P::Item>>,
    producers: Vec<ProducerHandle>,
    consumers: Vec<ConsumerHandle>,
}

impl<P: Processor> QueueProcessor<P> {
    /// set up the queue. no threads run until they are started
    pub fn new(processor: P, config: ProcessorConfig) -> Self {
        let (sender, receiver) = match config.capacity {
            0 => unbounded(),
            capacity => bounded(capacity),
        };

        Self {
            processor: Arc::new(processor),
            config,
            sender,
            receiver,
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// number of items waiting in the queue, poison included
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn start_producers(&mut self) -> ProcessorResult<()> {
        if !self.producers.is_empty() {
            return Err(ProcessorError::AlreadyStarted {
                role: Role::Producer,
            });
        }
        debug!(count = self.config.producer_count, "starting producers");

        for tid in 0..self.config.producer_count {
            let stop = Arc::new(AtomicBool::new(false));
            let processor = Arc::clone(&self.processor);
            let sender = self.sender.clone();
            let throttle = self.config.producer_throttle;
            let flag = Arc::clone(&stop);

            let thread = thread::Builder::new()
                .name(format!("producer-{}", tid))
                .spawn(move || run_producer(tid, &*processor, &sender, &flag, throttle))
                .map_err(|source| ProcessorError::Spawn {
                    role: Role::Producer,
                    tid,
                    source,
                })?;

            self.producers.push(ProducerHandle {
                tid,
                stop,
                thread: Some(thread),
            });
        }
        Ok(())
    }

    pub fn start_consumers(&mut self) -> ProcessorResult<()> {
        if !self.consumers.is_empty() {
            return Err(ProcessorError::AlreadyStarted {
                role: Role::Consumer,
            });
        }
        debug!(count = self.config.consumer_count, "starting consumers");

        for tid in 0..self.config.consumer_count {
            let processor = Arc::clone(&self.processor);
            let receiver = self.receiver.clone();

            let thread = thread::Builder::new()
                .name(format!("consumer-{}", tid))
                .spawn(move || run_consumer(tid, &*processor, &receiver))
                .map_err(|source| ProcessorError::Spawn {
                    role: Role::Consumer,
                    tid,
                    source,
                })?;

            self.consumers.push(ConsumerHandle {
                tid,
                thread: Some(thread),
            });
        }
        Ok(())
    }

    pub fn start_all(&mut self) -> ProcessorResult<()> {
        self.start_producers()?;
        self.start_consumers()
    }

    /// ask every producer to stop after its current batch
    pub fn stop_producers(&self) {
        debug!("stopping producers");
        for producer in &self.producers {
            debug!(tid = producer.tid, "producer stop signaled");
            producer.stop.store(true, Ordering::Release);
        }
    }

    /// wait for every producer to exit, either stopped or halted by its
    /// processor. blocks
    pub fn join_producers(&mut self) -> ProcessorResult<()> {
        debug!("joining producers");
        join_all(
            Role::Producer,
            self.producers.iter_mut().map(|p| (p.tid, p.thread.take())),
        )
    }

    /// queue one poison message per consumer. everything queued before it is
    /// still consumed. blocks while a bounded queue is full
    pub fn stop_consumers(&self) {
        debug!("stopping consumers");
        for _ in &self.consumers {
            // the processor holds a receiver, so the channel cannot be disconnected
            let _ = self.sender.send(Message::Poison);
        }
    }

    /// wait for every consumer to take its poison and exit. blocks
    pub fn join_consumers(&mut self) -> ProcessorResult<()> {
        debug!("joining consumers");
        join_all(
            Role::Consumer,
            self.consumers.iter_mut().map(|c| (c.tid, c.thread.take())),
        )
    }

    /// stop everything, leaving no produced item unconsumed. blocks until
    /// every worker has exited
    pub fn stop_all(&mut self) -> ProcessorResult<()> {
        self.stop_producers();
        self.join_producers()?;
        self.stop_consumers();
        self.join_consumers()
    }
}

impl<P: Processor> Drop for QueueProcessor<P> {
    fn drop(&mut self) {
        // consumers may still be parked on the queue; they exit once every
        // sender is gone
        for producer in &self.producers {
            producer.stop.store(true, Ordering::Release);
        }
    }
}

fn run_producer<P: Processor>(
    tid: usize,
    processor: &P,
    sender: &Sender<Message<P::Item>>,
    stop: &AtomicBool,
    throttle: Duration,
) {
    debug!(tid, "producer starting");

    while !stop.load(Ordering::Acquire) {
        let Some(items) = processor.produce(tid) else {
            debug!(tid, "producer halted by processor");
            break;
        };

        if items.is_empty() {
            debug!(tid, "producer received an empty batch, throttling");
            thread::sleep(throttle);
            continue;
        }

        for item in items {
            if sender.send(Message::Work(item)).is_err() {
                debug!(tid, "queue closed");
                return;
            }
        }
    }

    debug!(tid, "producer exiting");
}

fn run_consumer<P: Processor>(tid: usize, processor: &P, receiver: &Receiver<Message<P::Item>>) {
    debug!(tid, "consumer starting");

    loop {
        match receiver.recv() {
            Ok(Message::Work(item)) => processor.consume(tid, item),
            Ok(Message::Poison) => {
                debug!(tid, "consumer poisoned");
                break;
            }
            Err(_) => break,
        }
    }

    debug!(tid, "consumer exiting");
}

fn join_all(
    role: Role,
    threads: impl Iterator<Item = (usize, Option<JoinHandle<()>>)>,
) -> ProcessorResult<()> {
    let mut result = Ok(());
    for (tid, thread) in threads {
        if let Some(thread) = thread {
            if thread.join().is_err() && result.is_ok() {
                result = Err(ProcessorError::Panicked { role, tid });
            }
        }
    }
    result
}
