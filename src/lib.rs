pub mod access;
pub mod backend;
pub mod codec;
pub mod error;
pub mod handle;
pub mod repositories;
pub mod selftest;
pub mod value;

// Public, stable-ish API surface for consumers (CLI / other crates)

pub use crate::access::AccessRight;

pub use crate::backend::{namespace_path, RegistryBackend};

pub use crate::codec::{DecodeError, EncodeError, Object};

pub use crate::error::{RegistryError, Result};

pub use crate::handle::{remove_namespace, HandleInfo, HandleOptions, RegistryHandle};

pub use crate::repositories::{access_hint, is_admin, MemoryRegistry};

#[cfg(windows)]
pub use crate::repositories::WindowsRegistry;

pub use crate::value::{RegData, ValueType};

pub mod prelude {
    pub use crate::access::AccessRight;
    pub use crate::codec::Object;
    pub use crate::error::{RegistryError, Result};
    pub use crate::handle::{HandleOptions, RegistryHandle};
    pub use crate::value::{RegData, ValueType};
}
