pub mod identity;
pub mod keyshare;
pub mod storage;

// Re-export main types
pub use identity::{verify_signature, Gid, Identity};
pub use keyshare::{derive_key_share, KeyShare};
pub use storage::{load_identity, save_identity};
