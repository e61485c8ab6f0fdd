//! Registry commands against the engine's [`Registry`] backend.

use std::str::FromStr;

use crate::command::{Command, RegMultiAction, VarKey};
use crate::error::ScriptError;
use crate::escaper::{pack_reg_binary, pack_reg_multi_string, unpack_reg_binary, unpack_reg_multi_string};
use crate::log::LogEntry;
use crate::registry::{Hive, RegValue, RegValueKind};

use super::state::EngineState;
use super::string::parse_int;

/// Renders a value the way `RegRead` stores it in a variable.
fn format_value(value: &RegValue) -> String {
    match value {
        RegValue::None => String::new(),
        RegValue::Sz(s) | RegValue::ExpandSz(s) => s.clone(),
        RegValue::Binary(bytes) => pack_reg_binary(bytes, false),
        RegValue::Dword(n) => n.to_string(),
        RegValue::Qword(n) => n.to_string(),
        RegValue::MultiSz(items) => pack_reg_multi_string(items),
    }
}

/// Builds a typed value from `RegWrite` data operands.
fn build_value(kind: RegValueKind, data: &[String]) -> Result<RegValue, ScriptError> {
    let single = |what: &str| -> Result<String, ScriptError> {
        match data {
            [] => Ok(String::new()),
            [one] => Ok(one.clone()),
            _ => Err(ScriptError::execution(format!("{} accepts a single value", what))),
        }
    };
    let value = match kind {
        RegValueKind::None => {
            if !data.is_empty() {
                return Err(ScriptError::execution("REG_NONE does not take a value"));
            }
            RegValue::None
        }
        RegValueKind::Sz => RegValue::Sz(single("REG_SZ")?),
        RegValueKind::ExpandSz => RegValue::ExpandSz(single("REG_EXPAND_SZ")?),
        RegValueKind::Binary => RegValue::Binary(unpack_reg_binary(&data.join(","))?),
        RegValueKind::Dword => {
            let raw = single("REG_DWORD")?;
            let n = parse_int(&raw)?;
            let n = u32::try_from(n)
                .or_else(|_| i32::try_from(n).map(|v| v as u32))
                .map_err(|_| ScriptError::execution(format!("[{}] is not a valid REG_DWORD", raw)))?;
            RegValue::Dword(n)
        }
        RegValueKind::Qword => {
            let raw = single("REG_QWORD")?;
            let trimmed = raw.trim();
            let n = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => trimmed
                    .parse::<u64>()
                    .ok()
                    .or_else(|| trimmed.parse::<i64>().ok().map(|v| v as u64)),
            }
            .ok_or_else(|| ScriptError::execution(format!("[{}] is not a valid REG_QWORD", raw)))?;
            RegValue::Qword(n)
        }
        RegValueKind::MultiSz => match data {
            [one] => RegValue::MultiSz(unpack_reg_multi_string(one)),
            items => RegValue::MultiSz(items.to_vec()),
        },
    };
    Ok(value)
}

impl EngineState {
    pub(super) fn reg_read(&mut self, cmd: &Command, hive: &str, key: &str, value: &str, dest: &VarKey) -> Result<(), ScriptError> {
        let hive = Hive::from_str(&self.preprocess(hive)?)?;
        let key = self.preprocess(key)?;
        let name = self.preprocess(value)?;

        let found = {
            let handle = self
                .registry
                .open_key(hive, &key)?
                .ok_or_else(|| ScriptError::execution(format!("Registry key [{}\\{}] does not exist", hive, key)))?;
            handle.value(&name)
        };
        let found = found.ok_or_else(|| {
            ScriptError::execution(format!("Registry value [{}\\{}\\{}] does not exist", hive, key, name))
        })?;
        self.assign(cmd, dest, &format_value(&found))
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn reg_write(
        &mut self,
        cmd: &Command,
        hive: &str,
        value_type: &str,
        key: &str,
        value: &str,
        data: &[String],
        no_warn: bool,
    ) -> Result<(), ScriptError> {
        let hive = Hive::from_str(&self.preprocess(hive)?)?;
        let kind = RegValueKind::from_str(&self.preprocess(value_type)?)?;
        let key = self.preprocess(key)?;
        let name = self.preprocess(value)?;
        let data = self.preprocess_all(data)?;

        let typed = build_value(kind, &data)?;
        let shown = format_value(&typed);
        let replaced = self.registry.set_value(hive, &key, &name, typed)?;
        let message = format!("Registry value [{}\\{}\\{}] set to [{}]", hive, key, name, shown);
        let entry = if replaced && !no_warn {
            LogEntry::overwrite(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn reg_delete(&mut self, cmd: &Command, hive: &str, key: &str, value: Option<&str>) -> Result<(), ScriptError> {
        let hive = Hive::from_str(&self.preprocess(hive)?)?;
        let key = self.preprocess(key)?;
        let entry = match value {
            Some(raw) => {
                let name = self.preprocess(raw)?;
                if self.registry.delete_value(hive, &key, &name)? {
                    LogEntry::success(format!("Registry value [{}\\{}\\{}] deleted", hive, key, name))
                } else {
                    LogEntry::warning(format!("Registry value [{}\\{}\\{}] does not exist", hive, key, name))
                }
            }
            None => {
                if self.registry.delete_key(hive, &key)? {
                    LogEntry::success(format!("Registry key [{}\\{}] deleted", hive, key))
                } else {
                    LogEntry::warning(format!("Registry key [{}\\{}] does not exist", hive, key))
                }
            }
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn reg_multi(
        &mut self,
        cmd: &Command,
        hive: &str,
        key: &str,
        value: &str,
        action: &RegMultiAction,
    ) -> Result<(), ScriptError> {
        let hive = Hive::from_str(&self.preprocess(hive)?)?;
        let key = self.preprocess(key)?;
        let name = self.preprocess(value)?;
        let full = format!("{}\\{}\\{}", hive, key, name);

        let current = {
            let handle = self
                .registry
                .open_key(hive, &key)?
                .ok_or_else(|| ScriptError::execution(format!("Registry key [{}\\{}] does not exist", hive, key)))?;
            handle.value(&name)
        };
        let mut items = match current {
            Some(RegValue::MultiSz(items)) => items,
            Some(other) => {
                return Err(ScriptError::execution(format!(
                    "Registry value [{}] is not REG_MULTI_SZ ({:?})",
                    full,
                    other.kind()
                )))
            }
            None => return Err(ScriptError::execution(format!("Registry value [{}] does not exist", full))),
        };

        let message = match action {
            RegMultiAction::Append(item) | RegMultiAction::Prepend(item) => {
                let item = self.preprocess(item)?;
                items.retain(|existing| !existing.eq_ignore_ascii_case(&item));
                if matches!(action, RegMultiAction::Append(_)) {
                    items.push(item.clone());
                    format!("[{}] appended to [{}]", item, full)
                } else {
                    items.insert(0, item.clone());
                    format!("[{}] prepended to [{}]", item, full)
                }
            }
            RegMultiAction::Delete(item) => {
                let item = self.preprocess(item)?;
                let before = items.len();
                items.retain(|existing| !existing.eq_ignore_ascii_case(&item));
                if items.len() == before {
                    return Err(ScriptError::execution(format!("[{}] not found in [{}]", item, full)));
                }
                format!("[{}] deleted from [{}]", item, full)
            }
            RegMultiAction::Index { item, dest } => {
                let item = self.preprocess(item)?;
                let index = items
                    .iter()
                    .position(|existing| existing.eq_ignore_ascii_case(&item))
                    .map_or(0, |i| i + 1);
                return self.assign(cmd, dest, &index.to_string());
            }
        };

        self.registry.set_value(hive, &key, &name, RegValue::MultiSz(items))?;
        self.emit(cmd, LogEntry::success(message));
        Ok(())
    }
}
