pub mod error;
pub mod event;
pub mod ids;
pub mod models;

pub use error::CoreError;
pub use event::{Event, EventType};
