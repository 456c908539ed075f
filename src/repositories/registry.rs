//! Registry backend over winreg, rooted at `HKEY_LOCAL_MACHINE`.

use crate::access::AccessRight;
use crate::backend::RegistryBackend;
use crate::error::{RegistryError, Result};
use crate::value::RegData;
use std::io;
use tracing::{debug, instrument, trace};
use winreg::enums::{
    RegDisposition, HKEY_LOCAL_MACHINE, REG_BINARY, REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ,
    REG_QWORD, REG_SZ,
};
use winreg::types::{FromRegValue, ToRegValue};
use winreg::{RegKey, RegValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    #[must_use]
    pub const fn local_machine() -> Self {
        Self
    }

    fn root() -> RegKey {
        RegKey::predef(HKEY_LOCAL_MACHINE)
    }
}

fn map_err(context: &str, e: &io::Error) -> RegistryError {
    match e.kind() {
        io::ErrorKind::NotFound => RegistryError::NotFound(context.to_owned()),
        io::ErrorKind::PermissionDenied => RegistryError::AccessDenied(format!("{context}: {e}")),
        _ => RegistryError::Io(format!("{context}: {e}")),
    }
}

/// Deleting a key with subkeys fails with access denied; report it as such.
fn map_delete_err(parent: &RegKey, subkey: &str, e: &io::Error) -> RegistryError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        let has_children = parent
            .open_subkey(subkey)
            .is_ok_and(|key| key.enum_keys().next().is_some());
        if has_children {
            return RegistryError::KeyNotEmpty(subkey.to_owned());
        }
    }
    map_err(subkey, e)
}

fn to_data(raw: &RegValue) -> io::Result<RegData> {
    Ok(match raw.vtype {
        REG_SZ => RegData::String(String::from_reg_value(raw)?),
        REG_EXPAND_SZ => RegData::ExpandString(String::from_reg_value(raw)?),
        REG_MULTI_SZ => RegData::MultiString(Vec::<String>::from_reg_value(raw)?),
        REG_DWORD => RegData::Dword(u32::from_reg_value(raw)?),
        REG_QWORD => RegData::Qword(u64::from_reg_value(raw)?),
        _ => RegData::Binary(raw.bytes.to_vec()),
    })
}

fn write_data(key: &RegKey, name: &str, data: &RegData) -> io::Result<()> {
    match data {
        RegData::String(s) => key.set_value(name, s),
        RegData::ExpandString(s) => key.set_raw_value(
            name,
            &RegValue {
                vtype: REG_EXPAND_SZ,
                ..s.to_reg_value()
            },
        ),
        RegData::Binary(bytes) => key.set_raw_value(
            name,
            &RegValue {
                vtype: REG_BINARY,
                bytes: bytes.as_slice().into(),
            },
        ),
        RegData::Dword(v) => key.set_value(name, v),
        RegData::MultiString(items) => key.set_value(name, items),
        RegData::Qword(v) => key.set_value(name, v),
    }
}

impl RegistryBackend for WindowsRegistry {
    type Key = RegKey;

    #[instrument(level = "trace", skip(self), err(Display))]
    fn open_key(&self, path: &str, right: AccessRight) -> Result<RegKey> {
        trace!("Opening HKLM\\{} with {}", path, right);
        Self::root()
            .open_subkey_with_flags(path, right.mask())
            .map_err(|e| map_err(path, &e))
    }

    #[instrument(level = "debug", skip(self), err(Display))]
    fn create_key(&self, path: &str) -> Result<RegKey> {
        let (key, disposition) = Self::root()
            .create_subkey(path)
            .map_err(|e| map_err(path, &e))?;
        if matches!(disposition, RegDisposition::REG_CREATED_NEW_KEY) {
            debug!("Created HKLM\\{}", path);
        } else {
            debug!("Opened existing HKLM\\{}", path);
        }
        Ok(key)
    }

    #[instrument(level = "trace", skip(self, key))]
    fn query_value(&self, key: &RegKey, name: &str) -> Result<RegData> {
        key.get_raw_value(name)
            .and_then(|raw| to_data(&raw))
            .map_err(|e| map_err(name, &e))
    }

    #[instrument(level = "trace", skip(self, key))]
    fn query_default(&self, key: &RegKey, subkey: &str) -> Result<String> {
        let opened;
        let target = if subkey.is_empty() {
            key
        } else {
            opened = key.open_subkey(subkey).map_err(|e| map_err(subkey, &e))?;
            &opened
        };

        match target.get_raw_value("") {
            Ok(raw) => to_data(&raw)
                .map(|data| data.to_string())
                .map_err(|e| map_err(subkey, &e)),
            // An existing key without a default value reads as empty.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(map_err(subkey, &e)),
        }
    }

    #[instrument(level = "trace", skip(self, key, data))]
    fn set_value(&self, key: &RegKey, name: &str, data: &RegData) -> Result {
        write_data(key, name, data).map_err(|e| map_err(name, &e))
    }

    #[instrument(level = "trace", skip(self, key, value))]
    fn set_default(&self, key: &RegKey, subkey: &str, value: &str) -> Result {
        let data = RegData::String(value.to_owned());
        if subkey.is_empty() {
            return write_data(key, "", &data).map_err(|e| map_err(subkey, &e));
        }
        let (sub, _) = key
            .create_subkey(subkey)
            .map_err(|e| map_err(subkey, &e))?;
        write_data(&sub, "", &data).map_err(|e| map_err(subkey, &e))
    }

    #[instrument(level = "debug", skip(self, key), err(Display))]
    fn delete_key(&self, key: &RegKey, subkey: &str) -> Result {
        key.delete_subkey(subkey)
            .map_err(|e| map_delete_err(key, subkey, &e))
    }

    #[instrument(level = "debug", skip(self, key), err(Display))]
    fn delete_value(&self, key: &RegKey, name: &str) -> Result {
        key.delete_value(name).map_err(|e| map_err(name, &e))
    }

    fn close_key(&self, key: RegKey) {
        // RegKey closes its handle on drop.
        drop(key);
    }

    #[instrument(level = "debug", skip(self), err(Display))]
    fn delete_path(&self, path: &str) -> Result {
        let root = Self::root();
        root.delete_subkey(path)
            .map_err(|e| map_delete_err(&root, path, &e))
    }
}
