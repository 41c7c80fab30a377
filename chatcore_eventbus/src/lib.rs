pub mod bus;
pub mod config;
pub mod handler;
pub mod local_queue;

pub use bus::EventBus;
pub use config::EventBusConfig;
pub use handler::{Handler, HandlerFuture, Subscription};
