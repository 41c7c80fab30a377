use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chatcore_core::error::CoreError;
use chatcore_core::event::Event;

/// An async event handler, boxed so the bus can hold a heterogeneous
/// set of subscribers per topic.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send>>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Wraps a handler with the label used to dedupe `subscribe` calls
/// for the same (topic, label) pair.
#[derive(Clone)]
pub struct Subscription {
  pub label: String,
  pub handler: Handler,
}
