//! FFI bindings for UniFFI export
//!
//! This module provides Swift/Kotlin bindings for the mail crate via UniFFI.
//!
//! ## Usage from Swift
//!
//! ```swift
//! import MailFFI
//!
//! // Initialize logging first
//! initializeLogging(callback: myLogCallback, maxLevel: .info)
//!
//! let service = try MailService(dbPath: nil)
//!
//! let status = service.authStatus()
//! if !status.isAuthenticated {
//!     _ = try service.login()
//! }
//!
//! do {
//!     let result = try service.syncInbox(max: 10)
//!     show(result.messages)
//! } catch MailError.AuthRequired {
//!     showLoginPrompt()
//! }
//! ```

mod logging;
mod service;
mod types;

pub use logging::{clear_log_callback, initialize_logging, set_log_level};
pub use service::*;
pub use types::*;
