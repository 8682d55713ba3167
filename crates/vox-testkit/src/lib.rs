//! Shared test utilities for the vox-runtime workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only — never published.
//!
//! # Modules
//!
//! - [`library`] — [`LibraryBuilder`](library::LibraryBuilder) for on-disk
//!   library packages
//! - [`interpreter`] — stub [`Interpreter`](vox_loader::Interpreter)
//!   implementations

pub mod interpreter;
pub mod library;

/// Install a test-friendly tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
