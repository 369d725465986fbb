//! Swift/Kotlin bindings for the AI inbox
//!
//! Library-mode UniFFI wrapper around `mail::ffi`. The exported surface is
//! `MailService` plus the logging hooks; everything else stays in Rust.
//!
//! Generate Swift bindings from a release build:
//!
//! ```bash
//! cargo build --release -p mail-ffi
//! cargo run -p mail-ffi --features bindgen --bin uniffi-bindgen generate \
//!     --library target/release/libmail_ffi.dylib \
//!     --language swift \
//!     --out-dir generated/swift
//! ```

pub use mail::ffi::*;

mail::uniffi_reexport_scaffolding!();
