pub mod in_memory;
pub mod mock;
pub mod observability;
pub mod persistence;

pub use in_memory::InMemoryPersistence;
pub use mock::{MockExchange, MockNotifier};
pub use observability::{Metrics, MetricsReporter};
pub use persistence::{Database, SqlitePersistence};
