pub mod diagnostics;
pub mod misfire_queue;

pub use diagnostics::DiagnosticsLog;
pub use misfire_queue::MisfireQueue;
