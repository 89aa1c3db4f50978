//! Secure item service abstraction.
//!
//! The facade never touches platform APIs directly. It talks to a
//! [`SecureItemService`], with implementations for:
//! - In-memory storage (for testing)
//! - The macOS login keychain (generic credentials only)
//!
//! ## Usage
//!
//! ```rust
//! use keychain_lib::secure_storage::{InMemoryItemService, SecureItemService};
//!
//! let service = InMemoryItemService::new();
//! assert!(service.is_empty());
//! ```
//!
//! ## Security Considerations
//!
//! - Payloads are held in zeroizing buffers and never appear in `Debug` output
//! - Authentication prompts run outside any internal lock
//! - Status codes are passed through unchanged so callers can classify them

mod memory;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

pub use memory::InMemoryItemService;
pub use traits::{
    status, ApproveAll, AuthenticationOutcome, Authenticator, ParsedIdentity, Pkcs12Parser,
    SecureItemService, ServiceResult,
};

#[cfg(target_os = "macos")]
pub use macos::MacosItemService;
