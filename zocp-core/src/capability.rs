//! The capability tree: a nested mapping of named parameters and
//! objects, plus the current-object cursor used for scoped
//! registration.
//!
//! The tree is represented internally as a `serde_json::Value` object
//! rather than a typed struct tree, per the free-form on-wire shape:
//! `typeHint` is validated at `register_<type>` call sites, never on
//! merge. This crate does not walk the tree transitively except for
//! the deep-merge and path-lift operations, both of which are
//! shape-agnostic.

use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ZocpError};

/// The eight canonical type hints a parameter record may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeHint {
    Int,
    Float,
    Percent,
    Bool,
    String,
    Vec2f,
    Vec3f,
    Vec4f,
}

impl TypeHint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Percent => "percent",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Vec2f => "vec2f",
            Self::Vec3f => "vec3f",
            Self::Vec4f => "vec4f",
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeHint {
    type Err = ZocpError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "int" => Self::Int,
            "float" => Self::Float,
            "percent" => Self::Percent,
            "bool" => Self::Bool,
            "string" => Self::String,
            "vec2f" => Self::Vec2f,
            "vec3f" => Self::Vec3f,
            "vec4f" => Self::Vec4f,
            other => return Err(ZocpError::UnknownTypeHint(other.to_string())),
        })
    }
}

/// Access flags drawn from `{r, w, e, s}`, concatenated on the wire.
/// Order is not significant; consumers test membership, not position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub readable: bool,
    pub writeable: bool,
    pub emitter: bool,
    pub sensor: bool,
}

impl AccessFlags {
    #[must_use]
    pub const fn contains_read(self) -> bool {
        self.readable
    }

    #[must_use]
    pub const fn contains_write(self) -> bool {
        self.writeable
    }

    #[must_use]
    pub const fn contains_emitter(self) -> bool {
        self.emitter
    }

    #[must_use]
    pub const fn contains_sensor(self) -> bool {
        self.sensor
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.readable {
            f.write_str("r")?;
        }
        if self.writeable {
            f.write_str("w")?;
        }
        if self.emitter {
            f.write_str("e")?;
        }
        if self.sensor {
            f.write_str("s")?;
        }
        Ok(())
    }
}

impl FromStr for AccessFlags {
    type Err = ZocpError;

    fn from_str(s: &str) -> Result<Self> {
        let mut flags = Self::default();
        for c in s.chars() {
            match c {
                'r' => flags.readable = true,
                'w' => flags.writeable = true,
                'e' => flags.emitter = true,
                's' => flags.sensor = true,
                other => {
                    return Err(ZocpError::InvalidAccessFlags(format!(
                        "unrecognized access flag '{other}' in '{s}'"
                    )))
                }
            }
        }
        Ok(flags)
    }
}

/// Deep-merge `b` into `a`: recurse when both sides are objects at a
/// key, otherwise overwrite (lists are overwritten as atoms). Matches
/// `original_source/src/zocp.py`'s `dict_merge`.
pub fn merge(a: &mut Value, b: Value) {
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            for (k, v) in b_map {
                match a_map.get_mut(&k) {
                    Some(existing) if existing.is_object() && v.is_object() => {
                        merge(existing, v);
                    }
                    _ => {
                        a_map.insert(k, v);
                    }
                }
            }
        }
        (a_slot, b_val) => *a_slot = b_val,
    }
}

/// The node's capability tree plus the current-object registration
/// cursor.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTree {
    root: Map<String, Value>,
    /// Path of keys (`objects`, name, `objects`, name, ...) the cursor
    /// currently points at; empty means the root.
    cursor_path: Vec<String>,
}

impl CapabilityTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole tree wholesale.
    pub fn set_capability(&mut self, cap: Map<String, Value>) {
        self.root = cap;
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn merge_into_root(&mut self, data: Value) {
        let mut root = Value::Object(std::mem::take(&mut self.root));
        merge(&mut root, data);
        self.root = match root {
            Value::Object(m) => m,
            other => {
                // deep-merge never changes the root's own shape from
                // object to scalar because the incoming SET payload is
                // itself a mapping; guard anyway rather than panic.
                let mut m = Map::new();
                m.insert("value".to_string(), other);
                m
            }
        };
    }

    /// Read `capability[name].value`; root-only, per spec §4.1 (a
    /// deliberate simplification, not extended to nested objects per
    /// the Open Question in spec §9).
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.root.get(name)?.get("value")
    }

    /// Current registration cursor path, outermost-first
    /// (`["objects", "light1"]`), empty at the root.
    #[must_use]
    pub fn cursor_path(&self) -> &[String] {
        &self.cursor_path
    }

    /// Move the cursor. `name = None` resets to the root;
    /// `Some(name)` creates or updates an object record of the given
    /// `type` and points the cursor at it.
    pub fn set_object(&mut self, name: Option<&str>, obj_type: &str) {
        let Some(name) = name else {
            self.cursor_path = Vec::new();
            return;
        };

        let objects = self
            .root
            .entry("objects")
            .or_insert_with(|| Value::Object(Map::new()));
        let objects_map = objects
            .as_object_mut()
            .expect("objects key is always an object");
        objects_map
            .entry(name.to_string())
            .and_modify(|o| {
                o["type"] = Value::String(obj_type.to_string());
            })
            .or_insert_with(|| json!({ "type": obj_type }));

        self.cursor_path = vec!["objects".to_string(), name.to_string()];
    }

    fn cursor_object_mut(&mut self) -> &mut Map<String, Value> {
        let mut cur = &mut self.root;
        for key in &self.cursor_path {
            cur = cur
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .expect("cursor path always addresses an object");
        }
        cur
    }

    /// Register a parameter record under the cursor. Re-registering an
    /// existing name overwrites it. Bounds/step are included only if
    /// `Some`.
    pub fn register(
        &mut self,
        name: &str,
        value: Value,
        type_hint: TypeHint,
        access: AccessFlags,
        min: Option<Value>,
        max: Option<Value>,
        step: Option<Value>,
    ) -> Value {
        let mut record = Map::new();
        record.insert("value".to_string(), value);
        record.insert(
            "typeHint".to_string(),
            Value::String(type_hint.to_string()),
        );
        record.insert("access".to_string(), Value::String(access.to_string()));
        if let Some(min) = min {
            record.insert("min".to_string(), min);
        }
        if let Some(max) = max {
            record.insert("max".to_string(), max);
        }
        if let Some(step) = step {
            record.insert("step".to_string(), step);
        }
        record.insert("subscribers".to_string(), Value::Array(Vec::new()));

        let record_value = Value::Object(record);
        self.cursor_object_mut()
            .insert(name.to_string(), record_value.clone());
        record_value
    }

    /// Set a reserved (`_`-prefixed) header field at the root,
    /// returning the partial-MOD payload to notify with.
    pub fn set_reserved(&mut self, key: &str, value: Value) -> Value {
        self.root.insert(key.to_string(), value.clone());
        json!({ key: value })
    }

    /// Subscribers list projection for an emitter capability, as
    /// stored on the wire (`capability[emitter].subscribers`).
    pub fn subscribers_mut(&mut self, emitter: &str) -> Option<&mut Vec<Value>> {
        self.root
            .get_mut(emitter)?
            .get_mut("subscribers")?
            .as_array_mut()
    }

    /// Current value of an emitter, used by the SIG-demotion and
    /// `emit_signal` paths.
    pub fn set_value(&mut self, name: &str, value: Value) -> Option<()> {
        self.root.get_mut(name)?["value"] = value;
        Some(())
    }
}

/// Wrap `data` in the cursor's keys from innermost outward, so the
/// payload is rooted at the capability tree root. Spec §4.5 step 1.
#[must_use]
pub fn path_lift(cursor_path: &[String], mut data: Value) -> Value {
    for key in cursor_path.iter().rev() {
        data = json!({ key.clone(): data });
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_recurses_into_nested_objects() {
        let mut a = json!({ "a": { "value": 1, "other": "x" } });
        merge(&mut a, json!({ "a": { "value": 2 } }));
        assert_eq!(a, json!({ "a": { "value": 2, "other": "x" } }));
    }

    #[test]
    fn merge_overwrites_lists_as_atoms() {
        let mut a = json!({ "a": [1, 2, 3] });
        merge(&mut a, json!({ "a": [4] }));
        assert_eq!(a, json!({ "a": [4] }));
    }

    #[test]
    fn register_overwrites_existing_name() {
        let mut tree = CapabilityTree::new();
        tree.register(
            "x",
            json!(1),
            TypeHint::Int,
            AccessFlags::from_str("rw").unwrap(),
            None,
            None,
            None,
        );
        tree.register(
            "x",
            json!(2),
            TypeHint::Int,
            AccessFlags::from_str("r").unwrap(),
            Some(json!(0)),
            Some(json!(10)),
            None,
        );
        let rec = tree.as_map().get("x").unwrap();
        assert_eq!(rec["value"], json!(2));
        assert_eq!(rec["access"], json!("r"));
        assert_eq!(rec["min"], json!(0));
    }

    #[test]
    fn set_object_moves_cursor_and_registers_under_it() {
        let mut tree = CapabilityTree::new();
        tree.set_object(Some("light1"), "Light");
        assert_eq!(tree.cursor_path(), &["objects".to_string(), "light1".to_string()]);
        tree.register(
            "brightness",
            json!(0.5),
            TypeHint::Float,
            AccessFlags::from_str("rw").unwrap(),
            None,
            None,
            None,
        );
        assert_eq!(
            tree.as_map()["objects"]["light1"]["brightness"]["value"],
            json!(0.5)
        );
        tree.set_object(None, "Unknown");
        assert!(tree.cursor_path().is_empty());
    }

    #[test]
    fn reregistering_object_updates_type_without_losing_params() {
        let mut tree = CapabilityTree::new();
        tree.set_object(Some("o"), "A");
        tree.register(
            "p",
            json!(1),
            TypeHint::Int,
            AccessFlags::from_str("r").unwrap(),
            None,
            None,
            None,
        );
        tree.set_object(Some("o"), "B");
        assert_eq!(tree.as_map()["objects"]["o"]["type"], json!("B"));
        assert_eq!(tree.as_map()["objects"]["o"]["p"]["value"], json!(1));
    }

    #[test]
    fn get_value_is_root_only() {
        let mut tree = CapabilityTree::new();
        tree.set_object(Some("o"), "A");
        tree.register(
            "p",
            json!(1),
            TypeHint::Int,
            AccessFlags::from_str("r").unwrap(),
            None,
            None,
            None,
        );
        assert_eq!(tree.get_value("p"), None);
    }

    #[test]
    fn path_lift_wraps_innermost_outward() {
        let cursor = vec!["objects".to_string(), "light1".to_string()];
        let lifted = path_lift(&cursor, json!({ "brightness": { "value": 0.5 } }));
        assert_eq!(
            lifted,
            json!({ "objects": { "light1": { "brightness": { "value": 0.5 } } } })
        );
    }

    #[test]
    fn access_flags_roundtrip_ignores_order() {
        let flags = AccessFlags::from_str("wer").unwrap();
        assert!(flags.contains_read() && flags.contains_write() && flags.contains_emitter());
        assert!(!flags.contains_sensor());
        assert_eq!(flags.to_string(), "rwe");
    }

    #[test]
    fn access_flags_reject_unknown_letters() {
        assert!(AccessFlags::from_str("rx").is_err());
    }
}
