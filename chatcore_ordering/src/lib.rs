pub mod buffer;
pub mod buffered_event;

pub use buffer::{AddOutcome, DrainHandlerFuture, OrderingBuffer};
pub use buffered_event::BufferedEvent;
