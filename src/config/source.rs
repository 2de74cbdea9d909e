//! Configuration entries, the source trait, and the merge rules shared by all
//! sources.

use serde_yaml::{Mapping, Value};

use super::ConfigError;

/// A value to be merged into the configuration at `path`.
///
/// An empty path means the value is a whole document merged at the root.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub path: Vec<String>,
    pub value: Value,
}

impl ConfigEntry {
    pub fn root(mapping: Mapping) -> Self {
        Self {
            path: Vec::new(),
            value: Value::Mapping(mapping),
        }
    }

    pub fn at_path(path: Vec<String>, value: Value) -> Self {
        Self { path, value }
    }
}

/// A layer in the loading pipeline.
///
/// `current` is everything merged by earlier layers, which lets a source
/// shape its entries against the keys that already exist.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    fn entries(&self, current: &Mapping) -> Result<Vec<ConfigEntry>, ConfigError>;
}

/// A literal mapping is its own source, used for programmatic defaults.
impl ConfigSource for Mapping {
    fn entries(&self, _current: &Mapping) -> Result<Vec<ConfigEntry>, ConfigError> {
        Ok(vec![ConfigEntry::root(self.clone())])
    }
}

pub fn merge_entry(table: &mut Mapping, entry: ConfigEntry) -> Result<(), ConfigError> {
    merge_at_path(table, &entry.path, entry.value, "")
}

/// Deep-merges `overlay` into `base`.
///
/// Mappings merge key by key. Any other incoming value replaces what was
/// there, including an earlier mapping (last wins). A mapping arriving on
/// top of an existing scalar or sequence is a type mismatch.
pub fn deep_merge(base: &mut Mapping, overlay: Mapping) -> Result<(), ConfigError> {
    merge_into(base, overlay, "")
}

fn merge_into(base: &mut Mapping, overlay: Mapping, parent: &str) -> Result<(), ConfigError> {
    for (key, value) in overlay {
        let name = string_key(&key, parent)?;
        let path = join_key(parent, &name);
        if !value.is_mapping() {
            ensure_plain(&value, &path)?;
        }

        match (base.get_mut(name.as_str()), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                merge_into(existing, incoming, &path)?;
            }
            (Some(existing), Value::Mapping(_)) if !existing.is_null() => {
                return Err(ConfigError::TypeMismatch {
                    key: path,
                    expected: "mapping",
                    found: value_kind(existing),
                });
            }
            (_, Value::Mapping(incoming)) => {
                // Recurse into a fresh mapping so nested keys get checked too.
                let mut fresh = Mapping::new();
                merge_into(&mut fresh, incoming, &path)?;
                base.insert(Value::String(name), Value::Mapping(fresh));
            }
            (_, value) => {
                base.insert(Value::String(name), value);
            }
        }
    }
    Ok(())
}

fn merge_at_path(
    table: &mut Mapping,
    path: &[String],
    value: Value,
    parent: &str,
) -> Result<(), ConfigError> {
    let Some((first, rest)) = path.split_first() else {
        return match value {
            Value::Mapping(overlay) => merge_into(table, overlay, parent),
            other => Err(ConfigError::TypeMismatch {
                key: display_key(parent),
                expected: "mapping",
                found: value_kind(&other),
            }),
        };
    };
    let key = join_key(parent, first);

    if rest.is_empty() {
        let mut single = Mapping::new();
        single.insert(Value::String(first.clone()), value);
        return merge_into(table, single, parent);
    }

    match table.get(first.as_str()) {
        Some(Value::Mapping(_)) => {}
        None | Some(Value::Null) => {
            table.insert(Value::String(first.clone()), Value::Mapping(Mapping::new()));
        }
        Some(other) => {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: "mapping",
                found: value_kind(other),
            });
        }
    }

    match table.get_mut(first.as_str()) {
        Some(Value::Mapping(nested)) => merge_at_path(nested, rest, value, &key),
        _ => Ok(()),
    }
}

/// Rejects YAML tags and non-string keys anywhere inside `value`, including
/// mappings nested in sequences; only plain data is accepted.
fn ensure_plain(value: &Value, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::Tagged(tagged) => Err(ConfigError::UnsupportedTag {
            key: display_key(path),
            tag: tagged.tag.to_string(),
        }),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| ensure_plain(item, &format!("{path}[{i}]"))),
        Value::Mapping(mapping) => mapping.iter().try_for_each(|(key, item)| {
            let name = string_key(key, path)?;
            ensure_plain(item, &join_key(path, &name))
        }),
        _ => Ok(()),
    }
}

fn string_key(key: &Value, parent: &str) -> Result<String, ConfigError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Err(ConfigError::NonStringKey {
            parent: display_key(parent),
            key: format!("{other:?}"),
        }),
    }
}

pub(crate) fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn display_key(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

/// Human-readable name of a YAML value's type, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
