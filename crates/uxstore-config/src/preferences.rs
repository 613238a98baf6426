// ── File-backed preferences ──
//
// Loads the `preferences` namespace from a TOML file at start and
// writes it back on change. The store treats the loaded values like
// any other key update.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use futures_util::stream::select_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use uxstore_core::families::preferences::NAMESPACE;
use uxstore_core::{CoreError, EnumValue, KeyedStore, Value, ValueType};

use crate::ConfigError;

/// Preferences persisted as a flat TOML table keyed by preference name.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw table on disk. A missing file reads as empty.
    pub fn read(&self) -> Result<toml::Table, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Put every stored preference into `store`. Unknown names and
    /// values of the wrong shape are skipped. Returns how many were put.
    pub fn load_into(&self, store: &KeyedStore) -> Result<usize, ConfigError> {
        let table = self.read()?;
        let defs = store.registry().definitions(NAMESPACE)?;

        let mut loaded = 0_usize;
        for (name, raw) in &table {
            let Some(def) = defs.iter().find(|d| d.name() == name) else {
                warn!(preference = %name, "unknown preference in file, skipping");
                continue;
            };
            let Some(value) = from_toml(raw, def.value_type()) else {
                warn!(preference = %name, expected = %def.value_type(), "malformed preference, skipping");
                continue;
            };
            let key = store.key(NAMESPACE, name, &[])?;
            store.put(&key, value)?;
            loaded += 1;
        }
        debug!(path = %self.path.display(), loaded, "preferences loaded");
        Ok(loaded)
    }

    /// Write every set preference in `store` to the file. Returns how
    /// many were written.
    pub fn save_from(&self, store: &KeyedStore) -> Result<usize, ConfigError> {
        let mut table = toml::Table::new();
        for def in store.registry().definitions(NAMESPACE)? {
            let key = store.key(NAMESPACE, def.name(), &[])?;
            if let Some(value) = store.get_value(&key).as_ref().and_then(to_toml) {
                table.insert(def.name().to_owned(), value);
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&table)?)?;
        debug!(path = %self.path.display(), saved = table.len(), "preferences saved");
        Ok(table.len())
    }

    /// Save the file after every change to any preference key, until
    /// `cancel` fires. Must be called from within a tokio runtime.
    pub fn spawn_writeback(
        &self,
        store: &KeyedStore,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, ConfigError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| CoreError::NoRuntime)?;

        let mut observers = Vec::new();
        for def in store.registry().definitions(NAMESPACE)? {
            let key = store.key(NAMESPACE, def.name(), &[])?;
            observers.push(store.add_observer(&key));
        }

        let prefs = self.clone();
        let store = store.clone();
        Ok(handle.spawn(async move {
            let mut changes = select_all(observers);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    change = changes.next() => {
                        let Some(event) = change else { break };
                        if let Err(e) = prefs.save_from(&store) {
                            warn!(key = %event.key, error = %e, "preference write-back failed");
                        }
                    }
                }
            }
            debug!("preference write-back stopped");
        }))
    }
}

// ── TOML conversion ─────────────────────────────────────────────────

fn from_toml(raw: &toml::Value, ty: &ValueType) -> Option<Value> {
    match (ty, raw) {
        (ValueType::Bool, toml::Value::Boolean(b)) => Some(Value::Bool(*b)),
        (ValueType::Int, toml::Value::Integer(i)) => Some(Value::Int(*i)),
        (ValueType::Float, toml::Value::Float(f)) => Some(Value::Float(*f)),
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        (ValueType::Float, toml::Value::Integer(i)) => Some(Value::Float(*i as f64)),
        (ValueType::Text, toml::Value::String(s)) => Some(Value::Text(s.clone())),
        (ValueType::Enum(family), toml::Value::String(variant)) => {
            Some(Value::Enum(EnumValue::new(family.clone(), variant.clone())))
        }
        (ValueType::List(elem), toml::Value::Array(items)) => items
            .iter()
            .map(|item| from_toml(item, elem))
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        (ValueType::Record, toml::Value::Table(fields)) => {
            let mut record = std::collections::BTreeMap::new();
            for (name, field) in fields {
                record.insert(name.clone(), untyped_from_toml(field)?);
            }
            Some(Value::Record(record))
        }
        _ => None,
    }
}

/// Record fields carry no declared type; map each TOML kind directly.
fn untyped_from_toml(raw: &toml::Value) -> Option<Value> {
    match raw {
        toml::Value::Boolean(b) => Some(Value::Bool(*b)),
        toml::Value::Integer(i) => Some(Value::Int(*i)),
        toml::Value::Float(f) => Some(Value::Float(*f)),
        toml::Value::String(s) => Some(Value::Text(s.clone())),
        toml::Value::Array(items) => items
            .iter()
            .map(untyped_from_toml)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        toml::Value::Table(fields) => fields
            .iter()
            .map(|(k, v)| untyped_from_toml(v).map(|v| (k.clone(), v)))
            .collect::<Option<_>>()
            .map(Value::Record),
        toml::Value::Datetime(_) => None,
    }
}

fn to_toml(value: &Value) -> Option<toml::Value> {
    Some(match value {
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Int(i) => toml::Value::Integer(*i),
        Value::Float(f) => toml::Value::Float(*f),
        Value::Text(s) => toml::Value::String(s.clone()),
        Value::Enum(e) => toml::Value::String(e.variant().to_owned()),
        Value::List(items) => {
            toml::Value::Array(items.iter().map(to_toml).collect::<Option<Vec<_>>>()?)
        }
        Value::Record(fields) => {
            let mut table = toml::Table::new();
            for (name, field) in fields {
                table.insert(name.clone(), to_toml(field)?);
            }
            toml::Value::Table(table)
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn enum_preferences_round_trip_as_variant_names() {
        let ty = ValueType::Enum("unit_type".into());
        let raw = toml::Value::String("imperial".into());
        let value = from_toml(&raw, &ty).unwrap();
        assert_eq!(value, Value::Enum(EnumValue::new("unit_type", "imperial")));
        assert_eq!(to_toml(&value), Some(raw));
    }

    #[test]
    fn wrong_shape_does_not_convert() {
        assert!(from_toml(&toml::Value::String("yes".into()), &ValueType::Bool).is_none());
        let floats = ValueType::List(Box::new(ValueType::Float));
        let mixed = toml::Value::Array(vec![toml::Value::Float(1.0), toml::Value::Boolean(true)]);
        assert!(from_toml(&mixed, &floats).is_none());
    }

    #[test]
    fn integer_widens_to_float() {
        assert_eq!(
            from_toml(&toml::Value::Integer(3), &ValueType::Float),
            Some(Value::Float(3.0))
        );
    }
}
