pub mod batch;
pub mod queue;

pub use batch::{Batch, BatchAccumulator, DestinationGroup, group_by_destination};
pub use queue::{QueueConsumer, QueueError, QueueMetrics, QueueProducer, delivery_queue};
