pub mod record;
pub mod sink;
pub mod trail;

pub use record::{AuditInput, AuditRecord, GENESIS_HASH};
pub use sink::{AuditSink, JsonlSink, MemorySink};
pub use trail::AuditTrail;
