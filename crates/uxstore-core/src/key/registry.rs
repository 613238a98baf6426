// ── Key registry ──
//
// Namespaces declare their keys up front; `create_key` resolves a
// (namespace, name, params) triple into the one canonical `Key`.

use std::collections::HashMap;

use dashmap::DashMap;
use tracing::debug;

use super::{Key, KeyDef, is_valid_segment, key_path};
use crate::error::CoreError;
use crate::value::KeyValue;

/// A named family of key definitions.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    name: String,
    defs: Vec<KeyDef>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defs: Vec::new(),
        }
    }

    pub fn with_key(mut self, def: KeyDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defs(&self) -> &[KeyDef] {
        &self.defs
    }
}

/// Registry of every known namespace and every key resolved so far.
#[derive(Default)]
pub struct KeyRegistry {
    /// namespace -> key name -> definition
    namespaces: DashMap<String, DashMap<String, KeyDef>>,
    /// key path -> canonical key
    canonical: DashMap<String, Key>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) a namespace.
    ///
    /// Definitions already present with identical shape are accepted;
    /// a definition that changes an existing key's shape is rejected and
    /// nothing from the namespace is applied.
    pub fn register_namespace(&self, namespace: Namespace) -> Result<(), CoreError> {
        check_segment(&namespace.name)?;
        let mut declared: HashMap<&str, &KeyDef> = HashMap::with_capacity(namespace.defs.len());
        for def in &namespace.defs {
            check_segment(def.name())?;
            if let Some(earlier) = declared.insert(def.name(), def) {
                if *earlier != *def {
                    return Err(CoreError::ConflictingDefinition {
                        key: format!("{}/{}", namespace.name, def.name()),
                        existing: earlier.to_string(),
                    });
                }
            }
        }

        let entry = self.namespaces.entry(namespace.name.clone()).or_default();
        for def in &namespace.defs {
            if let Some(existing) = entry.get(def.name()) {
                if *existing != *def {
                    return Err(CoreError::ConflictingDefinition {
                        key: format!("{}/{}", namespace.name, def.name()),
                        existing: existing.to_string(),
                    });
                }
            }
        }

        let mut added = 0_usize;
        for def in namespace.defs {
            if !entry.contains_key(def.name()) {
                entry.insert(def.name().to_owned(), def);
                added += 1;
            }
        }
        debug!(namespace = %namespace.name, added, "namespace registered");
        Ok(())
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// Definitions declared under `namespace`, sorted by key name.
    pub fn definitions(&self, namespace: &str) -> Result<Vec<KeyDef>, CoreError> {
        let defs = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| CoreError::UnknownNamespace {
                namespace: namespace.to_owned(),
            })?;
        let mut out: Vec<KeyDef> = defs.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    /// Resolve a key. Idempotent: equal inputs return the same instance.
    pub fn create_key(&self, namespace: &str, name: &str, params: &[u32]) -> Result<Key, CoreError> {
        check_segment(namespace)?;
        check_segment(name)?;
        let path = key_path(namespace, name, params);
        if let Some(key) = self.canonical.get(&path) {
            return Ok(key.clone());
        }

        let def = {
            let defs = self
                .namespaces
                .get(namespace)
                .ok_or_else(|| CoreError::UnknownNamespace {
                    namespace: namespace.to_owned(),
                })?;
            let def = defs.get(name).ok_or_else(|| CoreError::UnknownKey {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })?;
            def.value().clone()
        };

        if def.arity() != params.len() {
            return Err(CoreError::ParamArity {
                key: format!("{namespace}/{name}"),
                expected: def.arity(),
                actual: params.len(),
            });
        }

        // First resolution wins when two callers race on the same path.
        let key = self
            .canonical
            .entry(path)
            .or_insert_with(|| Key::new(namespace, &def, params))
            .clone();
        Ok(key)
    }

    /// Resolve a key and check that it carries payloads of type `T`.
    pub fn create_typed<T: KeyValue>(
        &self,
        namespace: &str,
        name: &str,
        params: &[u32],
    ) -> Result<Key, CoreError> {
        let key = self.create_key(namespace, name, params)?;
        let wanted = T::value_type();
        if *key.value_type() != wanted {
            return Err(CoreError::ValueTypeMismatch {
                key: key.path().to_owned(),
                expected: key.value_type().clone(),
                actual: wanted,
            });
        }
        Ok(key)
    }
}

fn check_segment(segment: &str) -> Result<(), CoreError> {
    if is_valid_segment(segment) {
        Ok(())
    } else {
        Err(CoreError::InvalidKeyName {
            name: segment.to_owned(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::ValueType;

    fn registry() -> KeyRegistry {
        let registry = KeyRegistry::new();
        registry
            .register_namespace(
                Namespace::new("camera")
                    .with_key(KeyDef::new("display_name", ValueType::Text).indexed(1))
                    .with_key(KeyDef::new("iso", ValueType::Int).indexed(1)),
            )
            .unwrap();
        registry
    }

    #[test]
    fn create_key_is_idempotent() {
        let registry = registry();
        let a = registry.create_key("camera", "display_name", &[0]).unwrap();
        let b = registry.create_key("camera", "display_name", &[0]).unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(a.path(), "camera/display_name/0");
    }

    #[test]
    fn different_params_give_different_keys() {
        let registry = registry();
        let a = registry.create_key("camera", "iso", &[0]).unwrap();
        let b = registry.create_key("camera", "iso", &[1]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn resolution_errors() {
        let registry = registry();
        assert!(matches!(
            registry.create_key("gimbal", "yaw", &[]),
            Err(CoreError::UnknownNamespace { .. })
        ));
        assert!(matches!(
            registry.create_key("camera", "shutter", &[0]),
            Err(CoreError::UnknownKey { .. })
        ));
        assert!(matches!(
            registry.create_key("camera", "iso", &[]),
            Err(CoreError::ParamArity {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn typed_resolution_checks_declared_type() {
        let registry = registry();
        assert!(registry.create_typed::<i64>("camera", "iso", &[0]).is_ok());
        assert!(matches!(
            registry.create_typed::<String>("camera", "iso", &[0]),
            Err(CoreError::ValueTypeMismatch { .. })
        ));
    }

    #[test]
    fn reregistering_merges_and_rejects_conflicts() {
        let registry = registry();
        registry
            .register_namespace(
                Namespace::new("camera")
                    .with_key(KeyDef::new("iso", ValueType::Int).indexed(1))
                    .with_key(KeyDef::new("zoom_ratio", ValueType::Float).indexed(1)),
            )
            .unwrap();
        assert_eq!(registry.definitions("camera").unwrap().len(), 3);

        let err = registry
            .register_namespace(
                Namespace::new("camera").with_key(KeyDef::new("iso", ValueType::Float).indexed(1)),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictingDefinition { .. }));
        let iso = registry.create_key("camera", "iso", &[0]).unwrap();
        assert_eq!(*iso.value_type(), ValueType::Int);
    }

    #[test]
    fn duplicate_names_within_one_namespace_must_agree() {
        let registry = KeyRegistry::new();
        let err = registry
            .register_namespace(
                Namespace::new("gimbal")
                    .with_key(KeyDef::new("yaw", ValueType::Float))
                    .with_key(KeyDef::new("yaw", ValueType::Int)),
            )
            .unwrap_err();
        assert!(
            matches!(err, CoreError::ConflictingDefinition { .. }),
            "expected ConflictingDefinition, got: {err:?}"
        );
        assert!(!registry.has_namespace("gimbal"));

        registry
            .register_namespace(
                Namespace::new("gimbal")
                    .with_key(KeyDef::new("yaw", ValueType::Float))
                    .with_key(KeyDef::new("yaw", ValueType::Float)),
            )
            .unwrap();
        assert_eq!(registry.definitions("gimbal").unwrap().len(), 1);
    }

    #[test]
    fn path_separators_are_rejected_in_names() {
        let registry = registry();
        for namespace in [
            Namespace::new("camera/lens").with_key(KeyDef::new("iso", ValueType::Int)),
            Namespace::new("gimbal").with_key(KeyDef::new("mode/yaw", ValueType::Int)),
        ] {
            let result = registry.register_namespace(namespace);
            assert!(
                matches!(result, Err(CoreError::InvalidKeyName { .. })),
                "expected InvalidKeyName, got: {result:?}"
            );
        }

        registry.create_key("camera", "iso", &[0]).unwrap();
        let aliased = registry.create_key("camera", "iso/0", &[]);
        assert!(
            matches!(aliased, Err(CoreError::InvalidKeyName { .. })),
            "expected InvalidKeyName, got: {aliased:?}"
        );
    }
}
