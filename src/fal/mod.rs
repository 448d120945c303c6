pub mod engine;
pub mod registry;
pub mod transport;

pub use engine::{JobEngine, JobHandle};
pub use registry::{ModelBinding, ModelRegistry, DEFAULT_MODEL_ID};
pub use transport::{HttpQueueTransport, QueueTransport, RawReply};
