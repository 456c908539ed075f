//! Scoped access to one application's configuration key,
//! `HKLM\Software\<company>\<project>`.

use crate::access::AccessRight;
use crate::backend::{namespace_path, RegistryBackend};
use crate::codec::{self, Object};
use crate::error::{RegistryError, Result};
use crate::value::{RegData, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// How a handle acquires its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleOptions {
    /// Create the key when it cannot be opened. Also lifts the read-only
    /// guard on writes.
    pub create_if_missing: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

impl HandleOptions {
    #[must_use]
    pub const fn existing_only() -> Self {
        Self {
            create_if_missing: false,
        }
    }
}

/// Serializable snapshot of a handle's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleInfo {
    pub company: String,
    pub project: String,
    pub path: String,
    pub access: AccessRight,
    pub access_name: &'static str,
    pub writable: bool,
    pub create_if_missing: bool,
    pub open: bool,
}

pub struct RegistryHandle<B: RegistryBackend> {
    backend: B,
    company: String,
    project: String,
    path: String,
    create_if_missing: bool,
    access: AccessRight,
    key: Option<B::Key>,
}

fn validate_segment(kind: &str, value: &str) -> Result {
    if value.trim().is_empty() {
        return Err(RegistryError::InvalidNamespace(format!("{kind} is empty")));
    }
    if value.contains('\\') {
        return Err(RegistryError::InvalidNamespace(format!(
            "{kind} '{value}' contains a path separator"
        )));
    }
    Ok(())
}

/// Try each right from strongest to weakest, then fall back to creation.
fn acquire<B: RegistryBackend>(
    backend: &B,
    path: &str,
    create_if_missing: bool,
) -> Result<(B::Key, AccessRight)> {
    let mut last_error = None;

    for right in AccessRight::OPEN_ORDER {
        match backend.open_key(path, right) {
            Ok(key) => return Ok((key, right)),
            Err(e @ RegistryError::AccessDenied(_)) => {
                trace!("Tried rights {} on {}: {}", right, path, e);
                last_error = Some(e);
            }
            Err(e) => {
                debug!("Cannot open {}: {}", path, e);
                last_error = Some(e);
                break;
            }
        }
    }

    if !create_if_missing {
        return Err(match last_error {
            Some(RegistryError::AccessDenied(reason)) => {
                RegistryError::AccessDenied(format!("no access right granted on {path} ({reason})"))
            }
            Some(RegistryError::NotFound(_)) | None => RegistryError::CreationFailed(format!(
                "{path} does not exist and creation is disabled"
            )),
            Some(other) => RegistryError::CreationFailed(format!("{path}: {other}")),
        });
    }

    backend
        .create_key(path)
        .map(|key| (key, AccessRight::AllAccess))
        .map_err(|e| {
            error!("Failed to create {}: {}", path, e);
            RegistryError::CreationFailed(format!("{path}: {e}"))
        })
}

impl<B: RegistryBackend> RegistryHandle<B> {
    /// Open or create `Software\<company>\<project>` on `backend`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNamespace` for empty names or names containing `\`,
    /// `AccessDenied` when the key exists but no right can be obtained and
    /// creation is disabled, and `CreationFailed` when the key can neither be
    /// opened nor created
    pub fn open_with(
        backend: B,
        company: &str,
        project: &str,
        options: HandleOptions,
    ) -> Result<Self> {
        validate_segment("company", company)?;
        validate_segment("project", project)?;

        let path = namespace_path(company, project);
        let (key, access) = acquire(&backend, &path, options.create_if_missing)?;
        info!("Opened {} with {}", path, access.as_str());

        Ok(Self {
            backend,
            company: company.to_owned(),
            project: project.to_owned(),
            path,
            create_if_missing: options.create_if_missing,
            access,
            key: Some(key),
        })
    }

    #[must_use]
    pub fn company(&self) -> &str {
        &self.company
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The right the key was opened with.
    #[must_use]
    pub const fn access(&self) -> AccessRight {
        self.access
    }

    #[must_use]
    pub const fn create_if_missing(&self) -> bool {
        self.create_if_missing
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.key.is_some()
    }

    #[must_use]
    pub fn info(&self) -> HandleInfo {
        HandleInfo {
            company: self.company.clone(),
            project: self.project.clone(),
            path: self.path.clone(),
            access: self.access,
            access_name: self.access.as_str(),
            writable: self.create_if_missing || self.access.is_writable(),
            create_if_missing: self.create_if_missing,
            open: self.is_open(),
        }
    }

    fn key(&self) -> Result<&B::Key> {
        self.key.as_ref().ok_or(RegistryError::Closed)
    }

    fn ensure_writable(&self, target: &str) -> Result {
        if !self.create_if_missing && !self.access.is_writable() {
            warn!("Refusing write of '{}' to read-only {}", target, self.path);
            return Err(RegistryError::ReadOnly(format!(
                "cannot write '{target}': {} opened with {}",
                self.path,
                self.access.as_str()
            )));
        }
        Ok(())
    }

    /// Read a named value and its type.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the value is absent, `AccessDenied` if the handle
    /// cannot query values, `Closed` after [`close`](Self::close)
    pub fn get_value(&self, name: &str) -> Result<(RegData, ValueType)> {
        let data = self.backend.query_value(self.key()?, name)?;
        let ty = data.value_type();
        trace!("{}\\{} = {} ({})", self.path, name, data, ty);
        Ok((data, ty))
    }

    /// Like [`get_value`](Self::get_value), with an absent value as `None`.
    ///
    /// # Errors
    ///
    /// Returns every error of `get_value` except `NotFound`
    pub fn find_value(&self, name: &str) -> Result<Option<(RegData, ValueType)>> {
        match self.get_value(name) {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read the default value of `subkey`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the subkey is absent, `AccessDenied` if the
    /// handle cannot query values, `Closed` after [`close`](Self::close)
    pub fn get_default(&self, subkey: &str) -> Result<String> {
        self.backend.query_default(self.key()?, subkey)
    }

    /// Read and decode an object stored with [`set_encoded`](Self::set_encoded).
    ///
    /// # Errors
    ///
    /// Returns the errors of `get_default`, and `Decode` if the stored text is
    /// not an encoded object
    pub fn get_decoded(&self, subkey: &str) -> Result<Object> {
        let text = self.get_default(subkey)?;
        codec::decode(&text).map_err(|e| {
            debug!("Stored value of {}\\{} is not an object: {}", self.path, subkey, e);
            RegistryError::from(e)
        })
    }

    /// Write `value`'s string form as a `REG_SZ` value.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only handle, otherwise the errors of the
    /// backend write
    pub fn set_value(&self, name: &str, value: impl fmt::Display) -> Result {
        self.set_value_as(name, RegData::String(value.to_string()), ValueType::String)
    }

    /// Write `value` as type `ty`, converting it first.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only handle, `TypeMismatch` if `value`
    /// cannot be stored as `ty`, otherwise the errors of the backend write
    pub fn set_value_as(&self, name: &str, value: impl Into<RegData>, ty: ValueType) -> Result {
        let key = self.key()?;
        self.ensure_writable(name)?;
        let data = value.into().coerce(ty)?;
        self.backend.set_value(key, name, &data)?;
        debug!("Set {}\\{} ({})", self.path, name, ty);
        Ok(())
    }

    /// Write `value`'s string form as the default value of `subkey`,
    /// creating the subkey if needed.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only handle, otherwise the errors of the
    /// backend write
    pub fn set_default(&self, subkey: &str, value: impl fmt::Display) -> Result {
        let key = self.key()?;
        self.ensure_writable(subkey)?;
        self.backend.set_default(key, subkey, &value.to_string())?;
        debug!("Set default of {}\\{}", self.path, subkey);
        Ok(())
    }

    /// Encode `object` and store it as the default value of `subkey`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Encode` before touching the registry if the
    /// object cannot be encoded, otherwise the same as
    /// [`set_default`](Self::set_default)
    pub fn set_encoded(&self, subkey: &str, object: &Object) -> Result {
        let text = codec::encode(object)?;
        self.set_default(subkey, text)
    }

    /// Delete `subkey`, which must have no subkeys of its own.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent, `KeyNotEmpty` if it has subkeys
    pub fn delete_subkey(&self, subkey: &str) -> Result {
        self.backend.delete_key(self.key()?, subkey)?;
        info!("Deleted {}\\{}", self.path, subkey);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the value is absent
    pub fn delete_value(&self, name: &str) -> Result {
        self.backend.delete_value(self.key()?, name)?;
        info!("Deleted value {}\\{}", self.path, name);
        Ok(())
    }

    /// Release the key. Further calls do nothing.
    pub fn close(&mut self) {
        if let Some(key) = self.key.take() {
            self.backend.close_key(key);
            debug!("Closed {}", self.path);
        }
    }
}

impl<B: RegistryBackend> Drop for RegistryHandle<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: RegistryBackend> fmt::Debug for RegistryHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("create_if_missing", &self.create_if_missing)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(windows)]
impl RegistryHandle<crate::repositories::WindowsRegistry> {
    /// Open or create `HKLM\Software\<company>\<project>`.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with)
    pub fn open(company: &str, project: &str) -> Result<Self> {
        Self::open_with(
            crate::repositories::WindowsRegistry::local_machine(),
            company,
            project,
            HandleOptions::default(),
        )
    }
}

/// Delete `Software\<company>\<project>`, then `Software\<company>` unless
/// other projects remain under it.
///
/// # Errors
///
/// Returns `KeyNotEmpty` if the project key still has subkeys, `NotFound` if
/// it does not exist
pub fn remove_namespace<B: RegistryBackend>(backend: &B, company: &str, project: &str) -> Result {
    validate_segment("company", company)?;
    validate_segment("project", project)?;

    let path = namespace_path(company, project);
    backend.delete_path(&path)?;
    info!("Removed {}", path);

    let company_path = format!("Software\\{company}");
    match backend.delete_path(&company_path) {
        Ok(()) => info!("Removed {}", company_path),
        Err(RegistryError::KeyNotEmpty(_)) => debug!("Keeping {}: other projects remain", company_path),
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryRegistry;

    const PATH: &str = r"Software\Acme\Widget";

    fn open(reg: &MemoryRegistry) -> RegistryHandle<MemoryRegistry> {
        RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::default()).unwrap()
    }

    #[test]
    fn test_open_creates_missing_key() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);
        assert!(reg.contains_key(PATH));
        assert_eq!(handle.path(), PATH);
        assert_eq!(handle.access(), AccessRight::AllAccess);
        assert!(handle.is_open());
    }

    #[test]
    fn test_open_rejects_bad_namespace() {
        let reg = MemoryRegistry::new();
        for (company, project) in [("", "Widget"), ("Acme", "  "), (r"Acme\Evil", "Widget")] {
            let err = RegistryHandle::open_with(reg.clone(), company, project, HandleOptions::default())
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidNamespace(_)), "{company}/{project}");
        }
        assert!(!reg.contains_key("Software"));
    }

    #[test]
    fn test_open_missing_without_create_fails() {
        let reg = MemoryRegistry::new();
        let err = RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::existing_only())
            .unwrap_err();
        assert!(matches!(err, RegistryError::CreationFailed(_)));
        assert!(!reg.contains_key(PATH));
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_open_records_first_granted_right() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "x", RegData::Dword(1));
        reg.restrict(PATH, &[AccessRight::SetValue, AccessRight::QueryValue]);

        let handle =
            RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::existing_only())
                .unwrap();
        assert_eq!(handle.access(), AccessRight::SetValue);
        assert!(handle.info().writable);
    }

    #[test]
    fn test_open_reaches_weakest_right() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "x", RegData::Dword(1));
        reg.restrict(PATH, &[AccessRight::QueryValue]);

        let handle =
            RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::existing_only())
                .unwrap();
        assert_eq!(handle.access(), AccessRight::QueryValue);
        assert_eq!(handle.get_value("x").unwrap().0, RegData::Dword(1));
    }

    #[test]
    fn test_all_rights_denied() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "x", RegData::Dword(1));
        reg.restrict(PATH, &[]);

        let err = RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::existing_only())
            .unwrap_err();
        assert!(matches!(err, RegistryError::AccessDenied(_)));

        let err = RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::CreationFailed(_)));
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_read_only_handle_refuses_writes() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "port", RegData::from("80"));
        reg.restrict(PATH, &[AccessRight::Read]);

        let handle =
            RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::existing_only())
                .unwrap();
        assert_eq!(handle.access(), AccessRight::Read);
        assert!(!handle.info().writable);

        assert!(matches!(handle.set_value("port", 8080), Err(RegistryError::ReadOnly(_))));
        assert!(matches!(handle.set_default("cfg", "x"), Err(RegistryError::ReadOnly(_))));
        assert!(matches!(
            handle.set_encoded("cfg", &Object::Int(1)),
            Err(RegistryError::ReadOnly(_))
        ));
        assert_eq!(reg.peek(PATH, "port"), Some(RegData::from("80")));
        assert!(!reg.contains_key(r"Software\Acme\Widget\cfg"));
    }

    #[test]
    fn test_read_right_with_create_attempts_write() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "port", RegData::from("80"));
        reg.restrict(PATH, &[AccessRight::Read]);

        // The guard is lifted, so the write reaches the backend and is denied there.
        let handle =
            RegistryHandle::open_with(reg.clone(), "Acme", "Widget", HandleOptions::default())
                .unwrap();
        assert_eq!(handle.access(), AccessRight::Read);
        assert!(matches!(
            handle.set_value("port", 8080),
            Err(RegistryError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_value_round_trip_and_delete() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);

        handle.set_value("port", 8080).unwrap();
        assert_eq!(
            handle.get_value("port").unwrap(),
            (RegData::from("8080"), ValueType::String)
        );

        handle.delete_value("port").unwrap();
        assert!(handle.get_value("port").unwrap_err().is_not_found());
        assert_eq!(handle.find_value("port").unwrap(), None);
        assert!(handle.delete_value("port").unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_value_as_coerces() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);

        handle.set_value_as("port", "8080", ValueType::Dword).unwrap();
        assert_eq!(
            handle.get_value("port").unwrap(),
            (RegData::Dword(8080), ValueType::Dword)
        );

        handle.set_value_as("big", 7u32, ValueType::Qword).unwrap();
        assert_eq!(handle.get_value("big").unwrap().1, ValueType::Qword);

        let err = handle.set_value_as("bad", "eighty", ValueType::Dword).unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch(_)));
        assert_eq!(reg.peek(PATH, "bad"), None);
    }

    #[test]
    fn test_default_values() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);

        handle.set_default("test", "test_str").unwrap();
        assert_eq!(handle.get_default("test").unwrap(), "test_str");

        handle.delete_subkey("test").unwrap();
        assert!(handle.get_default("test").unwrap_err().is_not_found());
        assert!(handle.delete_subkey("test").unwrap_err().is_not_found());
    }

    #[test]
    fn test_encoded_objects() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);
        let tuple = Object::Tuple(vec![1.into(), 2.into(), 3.into(), "x".into()]);

        handle.set_encoded("cfg", &tuple).unwrap();
        assert_eq!(handle.get_decoded("cfg").unwrap(), tuple);

        handle.set_default("plain", "not an object").unwrap();
        assert!(matches!(handle.get_decoded("plain"), Err(RegistryError::Decode(_))));
    }

    #[test]
    fn test_set_encoded_rejects_deep_nesting() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);
        let mut deep = Object::Int(0);
        for _ in 0..70 {
            deep = Object::Tuple(vec![deep]);
        }

        assert!(matches!(
            handle.set_encoded("deep", &deep),
            Err(RegistryError::Encode(_))
        ));
        assert!(!reg.contains_key(r"Software\Acme\Widget\deep"));
    }

    #[test]
    fn test_delete_subkey_with_children() {
        let reg = MemoryRegistry::new();
        let handle = open(&reg);
        handle.set_default(r"outer\inner", "v").unwrap();

        assert!(matches!(
            handle.delete_subkey("outer"),
            Err(RegistryError::KeyNotEmpty(_))
        ));
        handle.delete_subkey(r"outer\inner").unwrap();
        handle.delete_subkey("outer").unwrap();
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let reg = MemoryRegistry::new();
        let mut handle = open(&reg);
        assert_eq!(reg.open_keys(), 1);

        handle.close();
        handle.close();
        assert_eq!(reg.open_keys(), 0);
        assert!(!handle.is_open());
        assert_eq!(handle.get_value("port"), Err(RegistryError::Closed));
        assert_eq!(handle.set_value("port", 1), Err(RegistryError::Closed));
        assert_eq!(handle.delete_subkey("cfg"), Err(RegistryError::Closed));

        drop(handle);
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_drop_releases_key() {
        let reg = MemoryRegistry::new();
        {
            let _handle = open(&reg);
            assert_eq!(reg.open_keys(), 1);
        }
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_scenario() {
        let reg = MemoryRegistry::new();
        let mut handle = open(&reg);

        handle.set_value("port", 8080).unwrap();
        assert_eq!(handle.get_value("port").unwrap().0.as_str(), Some("8080"));

        let cfg = Object::Tuple(vec![1.into(), 2.into(), 3.into(), "x".into()]);
        handle.set_encoded("cfg", &cfg).unwrap();
        assert_eq!(handle.get_decoded("cfg").unwrap().to_string(), "(1, 2, 3, 'x')");

        handle.delete_value("port").unwrap();
        assert!(handle.get_value("port").unwrap_err().is_not_found());

        handle.close();
        assert_eq!(handle.get_decoded("cfg"), Err(RegistryError::Closed));
    }

    #[test]
    fn test_remove_namespace() {
        let reg = MemoryRegistry::new();
        reg.seed(r"Software\Acme\Other", "", RegData::from("v"));
        drop(open(&reg));

        remove_namespace(&reg, "Acme", "Widget").unwrap();
        assert!(!reg.contains_key(PATH));
        assert!(reg.contains_key(r"Software\Acme\Other"));

        remove_namespace(&reg, "Acme", "Other").unwrap();
        assert!(!reg.contains_key(r"Software\Acme"));
        assert!(remove_namespace(&reg, "Acme", "Other").unwrap_err().is_not_found());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: HandleOptions = serde_json::from_str("{}").unwrap();
        assert!(options.create_if_missing);
        let options: HandleOptions =
            serde_json::from_str(r#"{"create_if_missing": false}"#).unwrap();
        assert_eq!(options, HandleOptions::existing_only());
    }
}
