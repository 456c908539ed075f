//! The narrow registry interface a [`RegistryHandle`](crate::RegistryHandle)
//! is built on.
//!
//! Paths are relative to the backend's root (`HKEY_LOCAL_MACHINE` for the
//! Windows backend) and use `\` as separator. Value names are relative to an
//! opened key; an empty value name addresses the key's default value.

use crate::access::AccessRight;
use crate::error::Result;
use crate::value::RegData;

pub trait RegistryBackend {
    /// An opened key. Released by [`RegistryBackend::close_key`].
    type Key;

    /// Open an existing key, requesting `right`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key does not exist, `AccessDenied` if `right` is
    /// not granted
    fn open_key(&self, path: &str, right: AccessRight) -> Result<Self::Key>;

    /// Open or create the key with full access.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the key cannot be created or opened
    fn create_key(&self, path: &str) -> Result<Self::Key>;

    /// # Errors
    ///
    /// `NotFound` if the value is absent, `AccessDenied` if the key was not
    /// opened for querying
    fn query_value(&self, key: &Self::Key, name: &str) -> Result<RegData>;

    /// Read the default value of `subkey` below `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the subkey or its default value is absent
    fn query_default(&self, key: &Self::Key, subkey: &str) -> Result<String>;

    /// # Errors
    ///
    /// `AccessDenied` if the key was not opened for setting values
    fn set_value(&self, key: &Self::Key, name: &str, data: &RegData) -> Result;

    /// Write the default value of `subkey`, creating the subkey if needed.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the key was not opened with sufficient rights
    fn set_default(&self, key: &Self::Key, subkey: &str, value: &str) -> Result;

    /// # Errors
    ///
    /// `NotFound` if absent, `KeyNotEmpty` if the subkey has subkeys
    fn delete_key(&self, key: &Self::Key, subkey: &str) -> Result;

    /// # Errors
    ///
    /// `NotFound` if the value is absent
    fn delete_value(&self, key: &Self::Key, name: &str) -> Result;

    fn close_key(&self, key: Self::Key);

    /// Delete the key at `path` relative to the root.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `KeyNotEmpty` if the key has subkeys
    fn delete_path(&self, path: &str) -> Result;
}

/// Build the namespace path for a company/project pair.
#[must_use]
pub fn namespace_path(company: &str, project: &str) -> String {
    format!("Software\\{company}\\{project}")
}
