//! OS backends for the capture traits
//!
//! Only Windows is implemented. Everything above this module is
//! platform-neutral and builds (and tests) anywhere.

#[cfg(windows)]
pub mod windows;
