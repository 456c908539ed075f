//! In-memory registry backend.
//!
//! Mirrors the parts of registry behavior the handle relies on: key names are
//! case-insensitive, a key with subkeys cannot be deleted, an unset default
//! value reads as an empty string and every operation is checked against the
//! rights the key was opened with. Access restrictions set with
//! [`MemoryRegistry::restrict`] apply to a path and everything below it.

use crate::access::AccessRight;
use crate::backend::RegistryBackend;
use crate::error::{RegistryError, Result};
use crate::value::RegData;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Node {
    /// Lowercased value name -> value. The empty name is the default value.
    values: BTreeMap<String, RegData>,
    children: BTreeMap<String, Node>,
}

#[derive(Debug, Default)]
struct State {
    root: Node,
    restrictions: HashMap<Vec<String>, Vec<AccessRight>>,
    open_keys: usize,
}

/// A shared in-memory registry. Clones see the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub struct MemoryKey {
    segments: Vec<String>,
    right: AccessRight,
}

fn split(path: &str) -> Vec<String> {
    path.split('\\')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn display(segments: &[String]) -> String {
    segments.join("\\")
}

impl Node {
    fn find(&self, segments: &[String]) -> Option<&Self> {
        segments
            .iter()
            .try_fold(self, |node, seg| node.children.get(seg))
    }

    fn find_mut(&mut self, segments: &[String]) -> Option<&mut Self> {
        segments
            .iter()
            .try_fold(self, |node, seg| node.children.get_mut(seg))
    }

    fn find_or_create(&mut self, segments: &[String]) -> &mut Self {
        segments.iter().fold(self, |node, seg| {
            node.children.entry(seg.clone()).or_default()
        })
    }
}

impl State {
    /// Rights granted on `segments`, from the nearest restricted ancestor.
    fn allowed(&self, segments: &[String]) -> Option<&[AccessRight]> {
        (0..=segments.len())
            .rev()
            .find_map(|n| self.restrictions.get(&segments[..n]))
            .map(Vec::as_slice)
    }

    fn check(&self, segments: &[String], right: AccessRight) -> Result {
        match self.allowed(segments) {
            Some(rights) if !rights.contains(&right) => Err(RegistryError::AccessDenied(format!(
                "{} with {}",
                display(segments),
                right.as_str()
            ))),
            _ => Ok(()),
        }
    }

    fn node(&self, key: &MemoryKey) -> Result<&Node> {
        self.root
            .find(&key.segments)
            .ok_or_else(|| RegistryError::NotFound(display(&key.segments)))
    }

    fn remove(&mut self, segments: &[String]) -> Result {
        let Some((name, parent)) = segments.split_last() else {
            return Err(RegistryError::AccessDenied("cannot delete the root key".into()));
        };
        self.check(segments, AccessRight::AllAccess)?;

        let parent = self
            .root
            .find_mut(parent)
            .ok_or_else(|| RegistryError::NotFound(display(segments)))?;
        let node = parent
            .children
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(display(segments)))?;
        if !node.children.is_empty() {
            return Err(RegistryError::KeyNotEmpty(display(segments)));
        }
        parent.children.remove(name);
        Ok(())
    }
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Only `rights` may be used to open `path` and the keys below it.
    /// Creating or deleting keys there requires `AllAccess` among them.
    pub fn restrict(&self, path: &str, rights: &[AccessRight]) {
        self.lock().restrictions.insert(split(path), rights.to_vec());
    }

    /// Number of keys opened and not yet closed.
    #[must_use]
    pub fn open_keys(&self) -> usize {
        self.lock().open_keys
    }

    #[must_use]
    pub fn contains_key(&self, path: &str) -> bool {
        self.lock().root.find(&split(path)).is_some()
    }

    /// Read a value directly, bypassing access checks.
    #[must_use]
    pub fn peek(&self, path: &str, name: &str) -> Option<RegData> {
        self.lock()
            .root
            .find(&split(path))?
            .values
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Create `path` and write a value directly, bypassing access checks.
    pub fn seed(&self, path: &str, name: &str, data: RegData) {
        self.lock()
            .root
            .find_or_create(&split(path))
            .values
            .insert(name.to_lowercase(), data);
    }
}

impl RegistryBackend for MemoryRegistry {
    type Key = MemoryKey;

    fn open_key(&self, path: &str, right: AccessRight) -> Result<MemoryKey> {
        let segments = split(path);
        let mut state = self.lock();
        if state.root.find(&segments).is_none() {
            return Err(RegistryError::NotFound(path.to_owned()));
        }
        state.check(&segments, right)?;
        state.open_keys += 1;
        Ok(MemoryKey { segments, right })
    }

    fn create_key(&self, path: &str) -> Result<MemoryKey> {
        let segments = split(path);
        let mut state = self.lock();
        state.check(&segments, AccessRight::AllAccess)?;
        state.root.find_or_create(&segments);
        state.open_keys += 1;
        Ok(MemoryKey {
            segments,
            right: AccessRight::AllAccess,
        })
    }

    fn query_value(&self, key: &MemoryKey, name: &str) -> Result<RegData> {
        if !key.right.can_query() {
            return Err(RegistryError::AccessDenied(format!(
                "query '{name}' with {}",
                key.right.as_str()
            )));
        }
        let state = self.lock();
        state
            .node(key)?
            .values
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    fn query_default(&self, key: &MemoryKey, subkey: &str) -> Result<String> {
        if !key.right.can_query() {
            return Err(RegistryError::AccessDenied(format!(
                "query '{subkey}' with {}",
                key.right.as_str()
            )));
        }
        let state = self.lock();
        let node = state
            .node(key)?
            .find(&split(subkey))
            .ok_or_else(|| RegistryError::NotFound(subkey.to_owned()))?;
        Ok(node
            .values
            .get("")
            .map(ToString::to_string)
            .unwrap_or_default())
    }

    fn set_value(&self, key: &MemoryKey, name: &str, data: &RegData) -> Result {
        if !key.right.can_set_value() {
            return Err(RegistryError::AccessDenied(format!(
                "set '{name}' with {}",
                key.right.as_str()
            )));
        }
        let mut state = self.lock();
        let node = state
            .root
            .find_mut(&key.segments)
            .ok_or_else(|| RegistryError::NotFound(display(&key.segments)))?;
        node.values.insert(name.to_lowercase(), data.clone());
        Ok(())
    }

    fn set_default(&self, key: &MemoryKey, subkey: &str, value: &str) -> Result {
        if !key.right.can_set_value() {
            return Err(RegistryError::AccessDenied(format!(
                "set '{subkey}' with {}",
                key.right.as_str()
            )));
        }
        let sub = split(subkey);
        let mut state = self.lock();
        let node = state
            .root
            .find_mut(&key.segments)
            .ok_or_else(|| RegistryError::NotFound(display(&key.segments)))?;
        if node.find(&sub).is_none() && !key.right.can_create_subkey() {
            return Err(RegistryError::AccessDenied(format!(
                "create '{subkey}' with {}",
                key.right.as_str()
            )));
        }
        node.find_or_create(&sub)
            .values
            .insert(String::new(), RegData::String(value.to_owned()));
        Ok(())
    }

    fn delete_key(&self, key: &MemoryKey, subkey: &str) -> Result {
        let mut segments = key.segments.clone();
        segments.extend(split(subkey));
        self.lock().remove(&segments)
    }

    fn delete_value(&self, key: &MemoryKey, name: &str) -> Result {
        if !key.right.can_set_value() {
            return Err(RegistryError::AccessDenied(format!(
                "delete '{name}' with {}",
                key.right.as_str()
            )));
        }
        let mut state = self.lock();
        let node = state
            .root
            .find_mut(&key.segments)
            .ok_or_else(|| RegistryError::NotFound(display(&key.segments)))?;
        node.values
            .remove(&name.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    fn close_key(&self, _key: MemoryKey) {
        let mut state = self.lock();
        state.open_keys = state.open_keys.saturating_sub(1);
    }

    fn delete_path(&self, path: &str) -> Result {
        self.lock().remove(&split(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = r"Software\Acme\Widget";

    #[test]
    fn test_open_missing_key() {
        let reg = MemoryRegistry::new();
        let err = reg.open_key(PATH, AccessRight::Read).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let reg = MemoryRegistry::new();
        let key = reg.create_key(PATH).unwrap();
        reg.set_value(&key, "Port", &RegData::Dword(1)).unwrap();
        assert!(reg.contains_key(r"software\ACME\widget"));
        assert_eq!(reg.peek(PATH, "PORT"), Some(RegData::Dword(1)));
        reg.close_key(key);
        assert_eq!(reg.open_keys(), 0);
    }

    #[test]
    fn test_restriction_is_inherited() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "x", RegData::Dword(1));
        reg.restrict(r"Software\Acme", &[AccessRight::Read]);

        assert!(reg.open_key(PATH, AccessRight::AllAccess).unwrap_err().is_access_denied());
        assert!(reg.create_key(PATH).unwrap_err().is_access_denied());
        let key = reg.open_key(PATH, AccessRight::Read).unwrap();
        assert_eq!(reg.query_value(&key, "x").unwrap(), RegData::Dword(1));
        assert!(reg.set_value(&key, "x", &RegData::Dword(2)).unwrap_err().is_access_denied());
    }

    #[test]
    fn test_rights_checked_per_operation() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "x", RegData::Dword(1));

        let key = reg.open_key(PATH, AccessRight::SetValue).unwrap();
        assert!(reg.query_value(&key, "x").unwrap_err().is_access_denied());
        reg.set_value(&key, "y", &RegData::Dword(2)).unwrap();
        assert!(reg.set_default(&key, "sub", "v").unwrap_err().is_access_denied());

        let key = reg.open_key(PATH, AccessRight::Write).unwrap();
        reg.set_default(&key, "sub", "v").unwrap();
        assert_eq!(reg.peek(&format!(r"{PATH}\sub"), ""), Some(RegData::from("v")));
    }

    #[test]
    fn test_default_of_bare_subkey_is_empty() {
        let reg = MemoryRegistry::new();
        reg.seed(&format!(r"{PATH}\bare\child"), "v", RegData::Dword(0));
        let key = reg.open_key(PATH, AccessRight::Read).unwrap();
        assert_eq!(reg.query_default(&key, "bare").unwrap(), "");
        assert!(reg.query_default(&key, "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_key_with_children_fails() {
        let reg = MemoryRegistry::new();
        reg.seed(&format!(r"{PATH}\parent\child"), "", RegData::from("v"));
        let key = reg.create_key(PATH).unwrap();

        assert!(matches!(
            reg.delete_key(&key, "parent"),
            Err(RegistryError::KeyNotEmpty(_))
        ));
        reg.delete_key(&key, r"parent\child").unwrap();
        reg.delete_key(&key, "parent").unwrap();
        assert!(reg.delete_key(&key, "parent").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_path() {
        let reg = MemoryRegistry::new();
        reg.seed(PATH, "", RegData::from("v"));
        assert!(matches!(
            reg.delete_path(r"Software\Acme"),
            Err(RegistryError::KeyNotEmpty(_))
        ));
        reg.delete_path(PATH).unwrap();
        reg.delete_path(r"Software\Acme").unwrap();
        assert!(!reg.contains_key(r"Software\Acme"));
        assert!(reg.contains_key("Software"));
    }
}
