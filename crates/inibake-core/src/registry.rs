//! Registry backend abstraction.
//!
//! Commands and branch conditions talk to the registry only through the
//! [`Registry`] trait. Keys are opened as [`KeyHandle`] guards; dropping the
//! guard releases the handle, so every exit path of a caller closes what it
//! opened. [`MemoryRegistry`] is the bundled backend and counts open handles
//! so leaks are observable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a registry backend.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid registry hive [{0}]")]
    InvalidHive(String),

    #[error("Invalid registry value type [{0}]")]
    InvalidValueType(String),

    #[error("Registry key [{0}] does not exist")]
    KeyNotFound(String),

    #[error("Registry backend lock poisoned")]
    Poisoned,
}

/// Registry root keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hive {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
}

impl Hive {
    pub fn short_name(&self) -> &'static str {
        match self {
            Hive::LocalMachine => "HKLM",
            Hive::CurrentUser => "HKCU",
            Hive::ClassesRoot => "HKCR",
            Hive::Users => "HKU",
            Hive::CurrentConfig => "HKCC",
        }
    }
}

impl FromStr for Hive {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Ok(Hive::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Ok(Hive::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Ok(Hive::ClassesRoot),
            "HKU" | "HKEY_USERS" => Ok(Hive::Users),
            "HKCC" | "HKEY_CURRENT_CONFIG" => Ok(Hive::CurrentConfig),
            _ => Err(RegistryError::InvalidHive(s.to_string())),
        }
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Value type tags, matching the Windows numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegValueKind {
    None,
    Sz,
    ExpandSz,
    Binary,
    Dword,
    MultiSz,
    Qword,
}

impl RegValueKind {
    pub fn code(&self) -> u32 {
        match self {
            RegValueKind::None => 0,
            RegValueKind::Sz => 1,
            RegValueKind::ExpandSz => 2,
            RegValueKind::Binary => 3,
            RegValueKind::Dword => 4,
            RegValueKind::MultiSz => 7,
            RegValueKind::Qword => 11,
        }
    }
}

impl FromStr for RegValueKind {
    type Err = RegistryError;

    /// Accepts `REG_SZ` style names or `0x1` style codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let by_name = match upper.as_str() {
            "REG_NONE" => Some(RegValueKind::None),
            "REG_SZ" => Some(RegValueKind::Sz),
            "REG_EXPAND_SZ" => Some(RegValueKind::ExpandSz),
            "REG_BINARY" => Some(RegValueKind::Binary),
            "REG_DWORD" => Some(RegValueKind::Dword),
            "REG_MULTI_SZ" => Some(RegValueKind::MultiSz),
            "REG_QWORD" => Some(RegValueKind::Qword),
            _ => None,
        };
        if let Some(kind) = by_name {
            return Ok(kind);
        }
        let code = upper
            .strip_prefix("0X")
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| RegistryError::InvalidValueType(s.to_string()))?;
        match code {
            0 => Ok(RegValueKind::None),
            1 => Ok(RegValueKind::Sz),
            2 => Ok(RegValueKind::ExpandSz),
            3 => Ok(RegValueKind::Binary),
            4 => Ok(RegValueKind::Dword),
            7 => Ok(RegValueKind::MultiSz),
            11 => Ok(RegValueKind::Qword),
            _ => Err(RegistryError::InvalidValueType(s.to_string())),
        }
    }
}

/// A typed registry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RegValue {
    None,
    Sz(String),
    ExpandSz(String),
    Binary(Vec<u8>),
    Dword(u32),
    MultiSz(Vec<String>),
    Qword(u64),
}

impl RegValue {
    pub fn kind(&self) -> RegValueKind {
        match self {
            RegValue::None => RegValueKind::None,
            RegValue::Sz(_) => RegValueKind::Sz,
            RegValue::ExpandSz(_) => RegValueKind::ExpandSz,
            RegValue::Binary(_) => RegValueKind::Binary,
            RegValue::Dword(_) => RegValueKind::Dword,
            RegValue::MultiSz(_) => RegValueKind::MultiSz,
            RegValue::Qword(_) => RegValueKind::Qword,
        }
    }
}

/// An open registry key.
pub trait RegistryKey {
    fn value(&self, name: &str) -> Option<RegValue>;
    fn value_names(&self) -> Vec<String>;
}

/// Scoped key handle; the backend is notified when it drops.
pub type KeyHandle<'a> = Box<dyn RegistryKey + 'a>;

/// Registry operations used by the engine.
pub trait Registry: Send + Sync {
    /// Opens `hive\path`. `Ok(None)` means the key does not exist.
    fn open_key(&self, hive: Hive, path: &str) -> Result<Option<KeyHandle<'_>>, RegistryError>;

    /// Writes a value, creating the key. Returns true if a value was replaced.
    fn set_value(&self, hive: Hive, path: &str, name: &str, value: RegValue) -> Result<bool, RegistryError>;

    /// Returns true if the value existed.
    fn delete_value(&self, hive: Hive, path: &str, name: &str) -> Result<bool, RegistryError>;

    /// Deletes a key and its sub-keys. Returns true if anything was removed.
    fn delete_key(&self, hive: Hive, path: &str) -> Result<bool, RegistryError>;
}

fn normalize_path(path: &str) -> String {
    path.trim_matches('\\').to_ascii_lowercase()
}

#[derive(Debug, Clone, Default, Serialize)]
struct MemoryKeyData {
    path: String,
    /// Lower-cased value name -> (display name, value).
    values: BTreeMap<String, (String, RegValue)>,
}

/// In-memory registry, safe to share across threads.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    keys: RwLock<BTreeMap<(Hive, String), MemoryKeyData>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles currently held by callers.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Dumps every key as JSON, for diagnostics.
    pub fn to_json(&self) -> Result<serde_json::Value, RegistryError> {
        let keys = self.keys.read().map_err(|_| RegistryError::Poisoned)?;
        let mut out = serde_json::Map::new();
        for ((hive, _), data) in keys.iter() {
            let values: serde_json::Map<String, serde_json::Value> = data
                .values
                .values()
                .map(|(name, value)| {
                    (name.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
                })
                .collect();
            out.insert(format!("{}\\{}", hive, data.path), serde_json::Value::Object(values));
        }
        Ok(serde_json::Value::Object(out))
    }

    fn key_exists(keys: &BTreeMap<(Hive, String), MemoryKeyData>, hive: Hive, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{}\\", path);
        keys.keys()
            .any(|(h, p)| *h == hive && (p == path || p.starts_with(&prefix)))
    }
}

struct MemoryKey {
    values: BTreeMap<String, (String, RegValue)>,
    open_handles: Arc<AtomicUsize>,
}

impl RegistryKey for MemoryKey {
    fn value(&self, name: &str) -> Option<RegValue> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.clone())
    }

    fn value_names(&self) -> Vec<String> {
        self.values.values().map(|(n, _)| n.clone()).collect()
    }
}

impl Drop for MemoryKey {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Registry for MemoryRegistry {
    fn open_key(&self, hive: Hive, path: &str) -> Result<Option<KeyHandle<'_>>, RegistryError> {
        let keys = self.keys.read().map_err(|_| RegistryError::Poisoned)?;
        let norm = normalize_path(path);
        if !Self::key_exists(&keys, hive, &norm) {
            return Ok(None);
        }
        let values = keys
            .get(&(hive, norm))
            .map(|k| k.values.clone())
            .unwrap_or_default();
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(MemoryKey {
            values,
            open_handles: self.open_handles.clone(),
        })))
    }

    fn set_value(&self, hive: Hive, path: &str, name: &str, value: RegValue) -> Result<bool, RegistryError> {
        let mut keys = self.keys.write().map_err(|_| RegistryError::Poisoned)?;
        let entry = keys
            .entry((hive, normalize_path(path)))
            .or_insert_with(|| MemoryKeyData {
                path: path.trim_matches('\\').to_string(),
                values: BTreeMap::new(),
            });
        Ok(entry
            .values
            .insert(name.to_ascii_lowercase(), (name.to_string(), value))
            .is_some())
    }

    fn delete_value(&self, hive: Hive, path: &str, name: &str) -> Result<bool, RegistryError> {
        let mut keys = self.keys.write().map_err(|_| RegistryError::Poisoned)?;
        Ok(keys
            .get_mut(&(hive, normalize_path(path)))
            .and_then(|k| k.values.remove(&name.to_ascii_lowercase()))
            .is_some())
    }

    fn delete_key(&self, hive: Hive, path: &str) -> Result<bool, RegistryError> {
        let mut keys = self.keys.write().map_err(|_| RegistryError::Poisoned)?;
        let norm = normalize_path(path);
        let prefix = format!("{}\\", norm);
        let before = keys.len();
        keys.retain(|(h, p), _| !(*h == hive && (*p == norm || p.starts_with(&prefix))));
        Ok(keys.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hive_parsing() {
        assert_eq!("hklm".parse::<Hive>().unwrap(), Hive::LocalMachine);
        assert_eq!("HKEY_CURRENT_USER".parse::<Hive>().unwrap(), Hive::CurrentUser);
        assert!("HKXX".parse::<Hive>().is_err());
    }

    #[test]
    fn value_kind_parsing() {
        assert_eq!("REG_SZ".parse::<RegValueKind>().unwrap(), RegValueKind::Sz);
        assert_eq!("0x7".parse::<RegValueKind>().unwrap(), RegValueKind::MultiSz);
        assert_eq!("0xB".parse::<RegValueKind>().unwrap(), RegValueKind::Qword);
        assert!("0x5".parse::<RegValueKind>().is_err());
        assert!("SZ".parse::<RegValueKind>().is_err());
        assert_eq!(RegValueKind::Qword.code(), 11);
    }

    #[test]
    fn set_and_read_back() {
        let reg = MemoryRegistry::new();
        assert!(!reg.set_value(Hive::LocalMachine, "Software\\Demo", "Name", RegValue::Sz("x".into())).unwrap());
        assert!(reg.set_value(Hive::LocalMachine, "software\\demo", "NAME", RegValue::Dword(1)).unwrap());

        let key = reg.open_key(Hive::LocalMachine, "SOFTWARE\\Demo").unwrap().unwrap();
        assert_eq!(key.value("name"), Some(RegValue::Dword(1)));
        assert_eq!(key.value_names(), vec!["NAME".to_string()]);
    }

    #[test]
    fn parent_keys_exist_implicitly() {
        let reg = MemoryRegistry::new();
        reg.set_value(Hive::CurrentUser, "A\\B\\C", "v", RegValue::None).unwrap();
        assert!(reg.open_key(Hive::CurrentUser, "A\\B").unwrap().is_some());
        assert!(reg.open_key(Hive::CurrentUser, "").unwrap().is_some());
        assert!(reg.open_key(Hive::CurrentUser, "A\\BC").unwrap().is_none());
        assert!(reg.open_key(Hive::LocalMachine, "A").unwrap().is_none());
    }

    #[test]
    fn handles_are_released_on_drop() {
        let reg = MemoryRegistry::new();
        reg.set_value(Hive::LocalMachine, "K", "v", RegValue::None).unwrap();
        {
            let _a = reg.open_key(Hive::LocalMachine, "K").unwrap();
            let _b = reg.open_key(Hive::LocalMachine, "K").unwrap();
            assert_eq!(reg.open_handles(), 2);
        }
        assert_eq!(reg.open_handles(), 0);
        // A missing key never hands out a handle.
        assert!(reg.open_key(Hive::LocalMachine, "Missing").unwrap().is_none());
        assert_eq!(reg.open_handles(), 0);
    }

    #[test]
    fn delete_key_removes_subtree() {
        let reg = MemoryRegistry::new();
        reg.set_value(Hive::LocalMachine, "A\\B", "v", RegValue::None).unwrap();
        reg.set_value(Hive::LocalMachine, "A", "w", RegValue::None).unwrap();
        reg.set_value(Hive::LocalMachine, "AB", "x", RegValue::None).unwrap();
        assert!(reg.delete_key(Hive::LocalMachine, "A").unwrap());
        assert!(reg.open_key(Hive::LocalMachine, "A").unwrap().is_none());
        assert!(reg.open_key(Hive::LocalMachine, "AB").unwrap().is_some());
        assert!(!reg.delete_value(Hive::LocalMachine, "AB", "missing").unwrap());
        assert!(reg.delete_value(Hive::LocalMachine, "AB", "X").unwrap());
    }

    #[test]
    fn json_dump() {
        let reg = MemoryRegistry::new();
        reg.set_value(Hive::LocalMachine, "Soft", "Name", RegValue::Sz("v".into())).unwrap();
        let json = reg.to_json().unwrap();
        assert_eq!(json["HKLM\\Soft"]["Name"]["type"], "Sz");
        assert_eq!(json["HKLM\\Soft"]["Name"]["data"], "v");
    }
}
