pub mod events;
pub mod store;

pub use events::{run_event_logger, EventPublisher, LifecycleEvent, RULES_VERSION};
pub use store::{SignalChain, SignalStore, WindowStats};
