//! Runtime value model
//!
//! The object graphs bindings produce on decode and consume on encode.
//! Scalars map to the XSD primitive families, [`Record`] is the generic
//! structured value, and [`DomainObject`] lets applications plug in their
//! own typed objects. Lazily opened sequences ([`ValueStream`]) and
//! self-encoding fragments ([`EncoderDelegate`]) are first-class values
//! so the encoder can close them and delegate to them.

use crate::error::{Error, Result};
use crate::namespaces::QName;
use crate::sax::ContentHandler;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Field name under which records keep their simple (text) content
pub const TEXT_KEY: &str = "$";

/// Runtime class of a structured value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Class {
    name: QName,
    parent: Option<Arc<Class>>,
}

impl Class {
    /// A root class
    pub fn new(name: QName) -> Self {
        Self { name, parent: None }
    }

    /// A class deriving from `parent`
    pub fn extending(name: QName, parent: &Class) -> Self {
        Self {
            name,
            parent: Some(Arc::new(parent.clone())),
        }
    }

    /// Class name
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Direct superclass
    pub fn parent(&self) -> Option<&Class> {
        self.parent.as_deref()
    }

    /// True when `self` is `other` or one of its descendants
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == other.name {
                return true;
            }
            current = class.parent();
        }
        false
    }

    /// Number of ancestors
    pub fn depth(&self) -> usize {
        self.parent().map_or(0, |p| p.depth() + 1)
    }
}

/// The type of value a binding declares it produces and accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// Anything
    Any,
    /// `Value::Bool`
    Bool,
    /// `Value::Integer`
    Integer,
    /// `Value::Double`
    Double,
    /// `Value::Decimal`, also accepts integers
    Decimal,
    /// `Value::String`
    String,
    /// `Value::Date`
    Date,
    /// `Value::DateTime`
    DateTime,
    /// `Value::Time`
    Time,
    /// `Value::Bytes`
    Bytes,
    /// `Value::List`
    List,
    /// Any `Value::Record`
    Record,
    /// Records and domain objects of a class or its subclasses
    Class(Class),
}

impl ValueType {
    /// True when `value` is an instance of this type
    pub fn is_assignable_from(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Integer, Value::Integer(_)) => true,
            (ValueType::Double, Value::Double(_)) => true,
            (ValueType::Decimal, Value::Decimal(_) | Value::Integer(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Date, Value::Date(_)) => true,
            (ValueType::DateTime, Value::DateTime(_)) => true,
            (ValueType::Time, Value::Time(_)) => true,
            (ValueType::Bytes, Value::Bytes(_)) => true,
            (ValueType::List, Value::List(_)) => true,
            (ValueType::Record, Value::Record(_)) => true,
            (ValueType::Class(class), value) => value
                .class()
                .map_or(false, |actual| actual.is_subclass_of(class)),
            _ => false,
        }
    }

    /// True when every instance of `other` is an instance of this type
    pub fn is_assignable_from_type(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::Any, _) => true,
            (ValueType::Decimal, ValueType::Integer) => true,
            (ValueType::Class(a), ValueType::Class(b)) => b.is_subclass_of(a),
            (a, b) => a == b,
        }
    }

    /// Position in the type lattice; subtypes rank strictly higher than
    /// their supertypes
    pub fn specificity(&self) -> usize {
        match self {
            ValueType::Any => 0,
            ValueType::Decimal | ValueType::Record => 1,
            ValueType::Class(class) => 2 + class.depth(),
            _ => 2,
        }
    }
}

/// A typed application object
pub trait DomainObject: fmt::Debug + Send + Sync {
    /// Runtime class, used for substitution matching
    fn class(&self) -> Class;

    /// Named property lookup
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// All properties in a stable order
    fn properties(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Downcasting support for bindings that know the concrete type
    fn as_any(&self) -> &dyn Any;
}

/// Cursor over child values
pub trait ValueIter: Send {
    /// Next value, `None` once exhausted
    fn next_value(&mut self) -> Result<Option<Value>>;

    /// Release underlying resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A lazily opened sequence of values, such as a database cursor
pub trait ValueStream: fmt::Debug + Send + Sync {
    /// Open a fresh cursor over the sequence
    fn open(&self) -> Result<Box<dyn ValueIter>>;
}

/// A value that writes its own markup, bypassing binding dispatch
pub trait EncoderDelegate: fmt::Debug + Send + Sync {
    /// Emit events for this value
    fn encode(&self, handler: &mut dyn ContentHandler) -> Result<()>;
}

/// Generic structured value: a class plus ordered named fields
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class: Class,
    fields: IndexMap<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new(class: Class) -> Self {
        Self {
            class,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Mutable access to a field
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Remove a field
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Record class
    pub fn class(&self) -> &Class {
        &self.class
    }
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / nil
    Null,
    /// xs:boolean
    Bool(bool),
    /// xs:integer family
    Integer(i64),
    /// xs:double, xs:float
    Double(f64),
    /// xs:decimal
    Decimal(Decimal),
    /// xs:string family and any unparsed lexical value
    String(String),
    /// xs:date
    Date(NaiveDate),
    /// xs:dateTime
    DateTime(DateTime<FixedOffset>),
    /// xs:time
    Time(NaiveTime),
    /// xs:base64Binary, xs:hexBinary
    Bytes(Vec<u8>),
    /// Sequence of values
    List(Vec<Value>),
    /// Generic structured value
    Record(Record),
    /// Application object
    Object(Arc<dyn DomainObject>),
    /// Lazily opened sequence
    Stream(Arc<dyn ValueStream>),
    /// Self-encoding fragment
    Fragment(Arc<dyn EncoderDelegate>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Double(a), Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Decimal(a), Decimal(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            (Stream(a), Stream(b)) => Arc::ptr_eq(a, b),
            (Fragment(a), Fragment(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// True for `Value::Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime class of structured values
    pub fn class(&self) -> Option<Class> {
        match self {
            Value::Record(record) => Some(record.class().clone()),
            Value::Object(object) => Some(object.class()),
            _ => None,
        }
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Record content, if this is a record
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Named property of a record or domain object
    pub fn property(&self, name: &str) -> Option<Value> {
        match self {
            Value::Record(record) => record.get(name).cloned(),
            Value::Object(object) => object.property(name),
            _ => None,
        }
    }

    /// The value carrying simple content: a record's text field, else itself
    pub fn simple_content(&self) -> &Value {
        match self {
            Value::Record(record) => record.get(TEXT_KEY).unwrap_or(&Value::Null),
            other => other,
        }
    }

    /// Apply `f` to the simple content, keeping any record wrapper
    pub fn map_simple(self, f: impl FnOnce(Value) -> Result<Value>) -> Result<Value> {
        match self {
            Value::Record(mut record) => {
                if let Some(text) = record.remove(TEXT_KEY) {
                    let mapped = f(text)?;
                    record.set(TEXT_KEY, mapped);
                }
                Ok(Value::Record(record))
            }
            other => f(other),
        }
    }

    /// Canonical lexical form of scalar content
    pub fn to_lexical(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Double(d) => Some(format_double(*d)),
            Value::Decimal(d) => Some(d.normalize().to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.to_rfc3339()),
            Value::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Value::Bytes(b) => Some(base64::engine::general_purpose::STANDARD.encode(b)),
            Value::List(items) => Some(
                items
                    .iter()
                    .filter_map(Value::to_lexical)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Value::Record(record) => record.get(TEXT_KEY).and_then(Value::to_lexical),
            Value::Object(_) | Value::Stream(_) | Value::Fragment(_) => None,
        }
    }

    /// Turn this value into a cursor
    ///
    /// With `multiple` set, lists and streams are unwrapped; every other
    /// value (and every value when `multiple` is unset) yields exactly once.
    pub fn into_cursor(self, multiple: bool) -> Result<Box<dyn ValueIter>> {
        if multiple {
            match self {
                Value::List(items) => return Ok(Box::new(ListIter::new(items))),
                Value::Stream(stream) => return stream.open(),
                other => return Ok(Box::new(SingleIter::new(other))),
            }
        }
        Ok(Box::new(SingleIter::new(self)))
    }

    /// Convert to JSON
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(format_double(*d))),
            Value::Decimal(d) => serde_json::Number::from_str(&d.normalize().to_string())
                .map(Json::Number)
                .unwrap_or_else(|_| Json::String(d.to_string())),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => Json::Object(
                record
                    .fields()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Value::Object(object) => Json::Object(
                object
                    .properties()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Value::Stream(_) | Value::Fragment(_) => Json::Null,
            other => other.to_lexical().map_or(Json::Null, Json::String),
        }
    }

    /// Build a value from JSON; objects become records of `class`, and
    /// nested objects get a class named after their field
    pub fn from_json(json: &serde_json::Value, class: &Class) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => {
                Value::List(items.iter().map(|item| Value::from_json(item, class)).collect())
            }
            Json::Object(map) => {
                let mut record = Record::new(class.clone());
                for (key, field) in map {
                    let child_class = Class::new(QName::new(
                        class.name().namespace.as_deref(),
                        key.as_str(),
                    ));
                    record.set(key.clone(), Value::from_json(field, &child_class));
                }
                Value::Record(record)
            }
        }
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        let text = if d > 0.0 { "INF" } else { "-INF" };
        text.to_string()
    } else {
        d.to_string()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Cursor yielding one value
#[derive(Debug)]
pub struct SingleIter {
    value: Option<Value>,
}

impl SingleIter {
    /// Wrap a single value
    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

impl ValueIter for SingleIter {
    fn next_value(&mut self) -> Result<Option<Value>> {
        Ok(self.value.take())
    }
}

/// Cursor over an owned list
#[derive(Debug)]
pub struct ListIter {
    items: std::vec::IntoIter<Value>,
}

impl ListIter {
    /// Iterate over `items`
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl ValueIter for ListIter {
    fn next_value(&mut self) -> Result<Option<Value>> {
        Ok(self.items.next())
    }
}

/// Parse an xs:dateTime lexical value; a missing offset means UTC
pub fn parse_date_time(text: &str) -> Result<DateTime<FixedOffset>> {
    use chrono::TimeZone;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| Error::Value(format!("invalid xs:dateTime '{}': {}", text, e)))?;
    let utc = FixedOffset::east_opt(0)
        .ok_or_else(|| Error::Value("invalid UTC offset".to_string()))?;
    Ok(utc.from_utc_datetime(&naive))
}
