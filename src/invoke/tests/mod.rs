//! Unit tests for the invoke module.
//!
//! Split into focused submodules: the invoker contract, version checks, and
//! the real process runners.

mod invoker;
