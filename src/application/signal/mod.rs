pub mod dispatcher;
pub mod emitter;

pub use dispatcher::{DeadLetter, DispatchPayload, NotificationDispatcher};
pub use emitter::{SignalEmitter, compute_levels};
