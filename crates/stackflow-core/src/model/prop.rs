//! Property values, handles and foreign references
//!
//! A [`Prop`] is the value tree stored in a resource's property bag. Besides
//! plain JSON-like values it can hold a [`Handle`] into another resource
//! (rendered as `Ref`/`Fn::GetAtt` or `Fn::ImportValue` at synthesis time)
//! and a [`ForeignRef`], which is an identifier coming from another target.

use super::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which value of a resource a handle points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    /// The resource's primary identifier (`Ref`)
    Ref,
    /// A named attribute (`Fn::GetAtt`)
    GetAtt(String),
}

/// Read-only reference to a resource declared in a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle {
    unit: String,
    logical_id: String,
    attribute: Attribute,
}

impl Handle {
    pub fn new(unit: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            logical_id: logical_id.into(),
            attribute: Attribute::Ref,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    /// Same resource, pointing at a named attribute instead
    pub fn attr(&self, name: impl Into<String>) -> Handle {
        Handle {
            unit: self.unit.clone(),
            logical_id: self.logical_id.clone(),
            attribute: Attribute::GetAtt(name.into()),
        }
    }

    pub fn arn(&self) -> Handle {
        self.attr("Arn")
    }

    /// Whether both handles point at the same resource, ignoring the attribute
    pub fn same_resource(&self, other: &Handle) -> bool {
        self.unit == other.unit && self.logical_id == other.logical_id
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.attribute {
            Attribute::Ref => write!(f, "{}/{}", self.unit, self.logical_id),
            Attribute::GetAtt(attr) => write!(f, "{}/{}.{}", self.unit, self.logical_id, attr),
        }
    }
}

/// Identifier that originates in a different deployment target
///
/// Cross-target values cannot be resolved through exports, so they travel as
/// raw strings. Keeping them in their own type stops them from being passed
/// where a same-target [`Handle`] is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    value: String,
    origin: Target,
}

impl ForeignRef {
    pub fn new(value: impl Into<String>, origin: Target) -> Self {
        Self {
            value: value.into(),
            origin,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn origin(&self) -> &Target {
        &self.origin
    }
}

/// Value stored in a resource property bag
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Prop>),
    Map(BTreeMap<String, Prop>),
    Handle(Handle),
    Foreign(ForeignRef),
    /// `Fn::Join`
    Join(String, Vec<Prop>),
    /// `Fn::Base64`
    Base64(Box<Prop>),
}

impl Prop {
    /// Build a map from key/value pairs
    pub fn map<K, I>(entries: I) -> Prop
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Prop)>,
    {
        Prop::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<T, I>(items: I) -> Prop
    where
        T: Into<Prop>,
        I: IntoIterator<Item = T>,
    {
        Prop::List(items.into_iter().map(Into::into).collect())
    }

    pub fn join<T, I>(delimiter: impl Into<String>, parts: I) -> Prop
    where
        T: Into<Prop>,
        I: IntoIterator<Item = T>,
    {
        Prop::Join(delimiter.into(), parts.into_iter().map(Into::into).collect())
    }

    pub fn base64(value: impl Into<Prop>) -> Prop {
        Prop::Base64(Box::new(value.into()))
    }

    /// Look up a key when this is a map
    pub fn get(&self, key: &str) -> Option<&Prop> {
        match self {
            Prop::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Prop::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Prop::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Prop::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// Every handle contained in this value, depth first
    pub fn handles(&self) -> Vec<&Handle> {
        let mut out = Vec::new();
        self.collect_handles(&mut out);
        out
    }

    fn collect_handles<'a>(&'a self, out: &mut Vec<&'a Handle>) {
        match self {
            Prop::Handle(h) => out.push(h),
            Prop::List(items) | Prop::Join(_, items) => {
                for item in items {
                    item.collect_handles(out);
                }
            }
            Prop::Map(map) => {
                for value in map.values() {
                    value.collect_handles(out);
                }
            }
            Prop::Base64(inner) => inner.collect_handles(out),
            Prop::Null
            | Prop::Bool(_)
            | Prop::Integer(_)
            | Prop::Float(_)
            | Prop::String(_)
            | Prop::Foreign(_) => {}
        }
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Prop::String(value.to_string())
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Prop::String(value)
    }
}

impl From<&String> for Prop {
    fn from(value: &String) -> Self {
        Prop::String(value.clone())
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Prop::Bool(value)
    }
}

impl From<i64> for Prop {
    fn from(value: i64) -> Self {
        Prop::Integer(value)
    }
}

impl From<i32> for Prop {
    fn from(value: i32) -> Self {
        Prop::Integer(value as i64)
    }
}

impl From<u16> for Prop {
    fn from(value: u16) -> Self {
        Prop::Integer(value as i64)
    }
}

impl From<u32> for Prop {
    fn from(value: u32) -> Self {
        Prop::Integer(value as i64)
    }
}

impl From<f64> for Prop {
    fn from(value: f64) -> Self {
        Prop::Float(value)
    }
}

impl From<Handle> for Prop {
    fn from(value: Handle) -> Self {
        Prop::Handle(value)
    }
}

impl From<&Handle> for Prop {
    fn from(value: &Handle) -> Self {
        Prop::Handle(value.clone())
    }
}

impl From<ForeignRef> for Prop {
    fn from(value: ForeignRef) -> Self {
        Prop::Foreign(value)
    }
}

impl From<&ForeignRef> for Prop {
    fn from(value: &ForeignRef) -> Self {
        Prop::Foreign(value.clone())
    }
}

impl<T: Into<Prop>> From<Vec<T>> for Prop {
    fn from(value: Vec<T>) -> Self {
        Prop::List(value.into_iter().map(Into::into).collect())
    }
}
