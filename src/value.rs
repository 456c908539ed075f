//! Native registry value payloads and their type tags.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry value type, numbered as in `winnt.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    String,
    ExpandString,
    Binary,
    Dword,
    MultiString,
    Qword,
}

impl ValueType {
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::String => 1,
            Self::ExpandString => 2,
            Self::Binary => 3,
            Self::Dword => 4,
            Self::MultiString => 7,
            Self::Qword => 11,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "REG_SZ",
            Self::ExpandString => "REG_EXPAND_SZ",
            Self::Binary => "REG_BINARY",
            Self::Dword => "REG_DWORD",
            Self::MultiString => "REG_MULTI_SZ",
            Self::Qword => "REG_QWORD",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RegData {
    String(String),
    ExpandString(String),
    Binary(Vec<u8>),
    Dword(u32),
    MultiString(Vec<String>),
    Qword(u64),
}

impl RegData {
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::ExpandString(_) => ValueType::ExpandString,
            Self::Binary(_) => ValueType::Binary,
            Self::Dword(_) => ValueType::Dword,
            Self::MultiString(_) => ValueType::MultiString,
            Self::Qword(_) => ValueType::Qword,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    /// Convert the payload to `ty`.
    ///
    /// Anything converts to a string through its display form; strings parse
    /// into numeric types.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when no conversion exists or parsing fails
    pub fn coerce(self, ty: ValueType) -> Result<Self> {
        if self.value_type() == ty {
            return Ok(self);
        }

        let mismatch = |data: &Self| {
            RegistryError::TypeMismatch(format!("{} cannot be stored as {ty}", data.value_type()))
        };

        match ty {
            ValueType::String => Ok(Self::String(self.to_string())),
            ValueType::ExpandString => Ok(Self::ExpandString(self.to_string())),
            ValueType::Dword => match &self {
                Self::Qword(v) => u32::try_from(*v).map(Self::Dword).map_err(|_| mismatch(&self)),
                Self::String(s) | Self::ExpandString(s) => s
                    .trim()
                    .parse()
                    .map(Self::Dword)
                    .map_err(|e| RegistryError::TypeMismatch(format!("'{s}' as {ty}: {e}"))),
                _ => Err(mismatch(&self)),
            },
            ValueType::Qword => match &self {
                Self::Dword(v) => Ok(Self::Qword(u64::from(*v))),
                Self::String(s) | Self::ExpandString(s) => s
                    .trim()
                    .parse()
                    .map(Self::Qword)
                    .map_err(|e| RegistryError::TypeMismatch(format!("'{s}' as {ty}: {e}"))),
                _ => Err(mismatch(&self)),
            },
            ValueType::MultiString => match self {
                Self::String(s) | Self::ExpandString(s) => Ok(Self::MultiString(vec![s])),
                other => Err(mismatch(&other)),
            },
            ValueType::Binary => Err(mismatch(&self)),
        }
    }
}

impl fmt::Display for RegData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::ExpandString(s) => f.write_str(s),
            Self::Binary(bytes) => f.write_str(&hex::encode(bytes)),
            Self::Dword(v) => write!(f, "{v}"),
            Self::Qword(v) => write!(f, "{v}"),
            Self::MultiString(items) => f.write_str(&items.join("\n")),
        }
    }
}

impl From<&str> for RegData {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for RegData {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<u32> for RegData {
    fn from(v: u32) -> Self {
        Self::Dword(v)
    }
}

impl From<u64> for RegData {
    fn from(v: u64) -> Self {
        Self::Qword(v)
    }
}

impl From<Vec<String>> for RegData {
    fn from(v: Vec<String>) -> Self {
        Self::MultiString(v)
    }
}

impl From<Vec<u8>> for RegData {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}
