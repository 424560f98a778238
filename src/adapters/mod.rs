//! Adapters - concrete implementations of ports (traits)

mod fs;
mod header_file;
mod memory_header;
mod pin_sources;
mod soft_authenticator;

// Re-export for convenience
pub use header_file::HeaderFile;
pub use memory_header::{MemoryHeader, MAX_TOKENS};
pub use pin_sources::{StaticPin, TerminalPin};
pub use soft_authenticator::{SoftAuthenticator, SoftAuthenticatorFinder, SoftSession};
