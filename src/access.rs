//! Registry access rights, in the order they are tried when opening a key.

use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_QUERY_VALUE: u32 = 0x0001;
const KEY_SET_VALUE: u32 = 0x0002;
const KEY_CREATE_SUB_KEY: u32 = 0x0004;
const KEY_ENUMERATE_SUB_KEYS: u32 = 0x0008;
const KEY_NOTIFY: u32 = 0x0010;
const KEY_CREATE_LINK: u32 = 0x0020;
const READ_CONTROL: u32 = 0x0002_0000;
const STANDARD_RIGHTS_REQUIRED: u32 = 0x000F_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessRight {
    AllAccess,
    Write,
    Read,
    CreateSubKey,
    SetValue,
    EnumerateSubKeys,
    QueryValue,
}

impl AccessRight {
    /// Strongest first.
    pub const OPEN_ORDER: [Self; 7] = [
        Self::AllAccess,
        Self::Write,
        Self::Read,
        Self::CreateSubKey,
        Self::SetValue,
        Self::EnumerateSubKeys,
        Self::QueryValue,
    ];

    /// The `REGSAM` mask passed to the OS when opening with this right.
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::AllAccess => {
                STANDARD_RIGHTS_REQUIRED
                    | KEY_QUERY_VALUE
                    | KEY_SET_VALUE
                    | KEY_CREATE_SUB_KEY
                    | KEY_ENUMERATE_SUB_KEYS
                    | KEY_NOTIFY
                    | KEY_CREATE_LINK
            }
            Self::Write => READ_CONTROL | KEY_SET_VALUE | KEY_CREATE_SUB_KEY,
            Self::Read => READ_CONTROL | KEY_QUERY_VALUE | KEY_ENUMERATE_SUB_KEYS | KEY_NOTIFY,
            Self::CreateSubKey => KEY_CREATE_SUB_KEY,
            Self::SetValue => KEY_SET_VALUE,
            Self::EnumerateSubKeys => KEY_ENUMERATE_SUB_KEYS,
            Self::QueryValue => KEY_QUERY_VALUE,
        }
    }

    /// Rights under which writes are attempted on a handle that may not create.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(
            self,
            Self::AllAccess | Self::Write | Self::CreateSubKey | Self::SetValue
        )
    }

    #[must_use]
    pub const fn can_query(self) -> bool {
        self.mask() & KEY_QUERY_VALUE != 0
    }

    #[must_use]
    pub const fn can_set_value(self) -> bool {
        self.mask() & KEY_SET_VALUE != 0
    }

    #[must_use]
    pub const fn can_create_subkey(self) -> bool {
        self.mask() & KEY_CREATE_SUB_KEY != 0
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllAccess => "KEY_ALL_ACCESS",
            Self::Write => "KEY_WRITE",
            Self::Read => "KEY_READ",
            Self::CreateSubKey => "KEY_CREATE_SUB_KEY",
            Self::SetValue => "KEY_SET_VALUE",
            Self::EnumerateSubKeys => "KEY_ENUMERATE_SUB_KEYS",
            Self::QueryValue => "KEY_QUERY_VALUE",
        }
    }
}

impl fmt::Display for AccessRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:05x})", self.as_str(), self.mask())
    }
}
