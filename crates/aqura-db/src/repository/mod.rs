//! Repository implementations for the queue store.

pub mod queue;

pub use queue::QueueRepository;
