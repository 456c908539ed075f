//! Concrete registry access: the winreg backend, the in-memory backend and
//! the elevation check.

pub mod elevation;
pub mod memory;
#[cfg(windows)]
pub mod registry;

pub use elevation::{access_hint, is_admin};
pub use memory::{MemoryKey, MemoryRegistry};
#[cfg(windows)]
pub use registry::WindowsRegistry;
