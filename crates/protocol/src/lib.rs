pub mod messages;

// Re-export main types
pub use messages::{AccessMessage, KeyRequest, KeyResponse, Reject, RejectCode};
