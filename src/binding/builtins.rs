//! Bindings for the XSD built-in types
//!
//! `xs:anyType` turns element content into [`Record`]s; the simple type
//! bindings convert lexical values into typed [`Value`]s. Subtypes without
//! a binding of their own (for example `xs:anyURI`) inherit the chain of
//! their base type.

use super::Binding;
use crate::decoder::Node;
use crate::error::{Error, Result};
use crate::namespaces::QName;
use crate::schema::builtins::xs;
use crate::schema::{ElementDeclaration, TypeId};
use crate::value::{parse_date_time, Record, Value, ValueType, TEXT_KEY};
use base64::Engine as _;
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Binding for `xs:anyType`
#[derive(Debug, Default)]
pub struct AnyTypeBinding;

impl Binding for AnyTypeBinding {
    fn target(&self) -> QName {
        xs("anyType")
    }

    fn value_type(&self) -> Option<ValueType> {
        Some(ValueType::Any)
    }

    fn parse(&self, node: &Node, value: Value) -> Result<Value> {
        if node.is_simple() {
            if !value.is_null() {
                return Ok(value);
            }
            if node.type_name.as_ref() == Some(&xs("anyType")) {
                return Ok(node.text.clone().map_or(Value::Null, Value::String));
            }
        }

        let mut record = Record::new(node.class());
        for (name, attribute) in &node.attributes {
            record.set(name.local_name.clone(), attribute.clone());
        }
        for child in &node.children {
            let key = child.name.local_name.as_str();
            match record.get_mut(key) {
                Some(Value::List(items)) if child.multiple => items.push(child.value.clone()),
                Some(existing) => {
                    let first = std::mem::replace(existing, Value::Null);
                    *existing = Value::List(vec![first, child.value.clone()]);
                }
                None if child.multiple => record.set(key, Value::List(vec![child.value.clone()])),
                None => record.set(key, child.value.clone()),
            }
        }
        if !value.is_null() {
            record.set(TEXT_KEY, value);
        } else if let Some(text) = node.text.as_ref().filter(|t| !t.trim().is_empty()) {
            record.set(TEXT_KEY, text.clone());
        }
        Ok(Value::Record(record))
    }

    fn encode_text(&self, value: &Value, text: Option<String>) -> Result<Option<String>> {
        Ok(text.or_else(|| value.to_lexical()))
    }

    fn property(&self, value: &Value, name: &QName) -> Result<Option<Value>> {
        Ok(value.property(&name.local_name))
    }

    fn properties(&self, value: &Value, element: &ElementDeclaration) -> Result<Vec<(QName, Value)>> {
        if element.type_id != TypeId::ANY_TYPE {
            return Ok(Vec::new());
        }
        let namespace = element.name.namespace.clone();
        let fields: Vec<(String, Value)> = match value {
            Value::Record(record) => record
                .fields()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            Value::Object(object) => object.properties(),
            _ => Vec::new(),
        };
        Ok(fields
            .into_iter()
            .filter(|(key, _)| key != TEXT_KEY)
            .map(|(key, v)| (QName::new(namespace.clone(), key), v))
            .collect())
    }
}

/// Binding for `xs:anySimpleType`
#[derive(Debug, Default)]
pub struct AnySimpleTypeBinding;

impl Binding for AnySimpleTypeBinding {
    fn target(&self) -> QName {
        xs("anySimpleType")
    }

    fn value_type(&self) -> Option<ValueType> {
        Some(ValueType::Any)
    }

    fn parse(&self, node: &Node, value: Value) -> Result<Value> {
        if value.is_null() && !node.nil {
            return Ok(Value::String(node.text.clone().unwrap_or_default()));
        }
        Ok(value)
    }

    fn encode_text(&self, value: &Value, text: Option<String>) -> Result<Option<String>> {
        Ok(text.or_else(|| value.simple_content().to_lexical()))
    }
}

type Convert = fn(Value) -> Result<Value>;
type Format = fn(&Value) -> Option<String>;

/// Binding for an atomic built-in: converts the simple content of the
/// value produced by the base type bindings
#[derive(Debug, Clone)]
pub struct SimpleTypeBinding {
    target: QName,
    value_type: ValueType,
    convert: Convert,
    format: Option<Format>,
}

impl SimpleTypeBinding {
    /// Binding for `xs:{local}`
    pub fn new(local: &str, value_type: ValueType, convert: Convert) -> Self {
        Self {
            target: xs(local),
            value_type,
            convert,
            format: None,
        }
    }

    /// Use a custom lexical form on encode
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }
}

impl Binding for SimpleTypeBinding {
    fn target(&self) -> QName {
        self.target.clone()
    }

    fn value_type(&self) -> Option<ValueType> {
        Some(self.value_type.clone())
    }

    fn parse(&self, _node: &Node, value: Value) -> Result<Value> {
        value.map_simple(|simple| match simple {
            Value::Null => Ok(Value::Null),
            other => (self.convert)(other),
        })
    }

    fn encode_text(&self, value: &Value, text: Option<String>) -> Result<Option<String>> {
        match self.format {
            Some(format) => Ok(format(value.simple_content()).or(text)),
            None => Ok(text),
        }
    }
}

fn invalid(type_name: &str, value: &Value) -> Error {
    Error::Value(format!(
        "invalid xs:{} value '{}'",
        type_name,
        value.to_lexical().unwrap_or_default()
    ))
}

fn identity(value: Value) -> Result<Value> {
    Ok(value)
}

fn to_normalized(value: Value) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(s.replace(['\t', '\n', '\r'], " "))),
        other => Ok(other),
    }
}

fn to_token(value: Value) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))),
        other => Ok(other),
    }
}

fn to_boolean(value: Value) -> Result<Value> {
    match &value {
        Value::Bool(_) => Ok(value),
        Value::String(s) => match s.trim() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean", &value)),
        },
        _ => Err(invalid("boolean", &value)),
    }
}

fn to_decimal(value: Value) -> Result<Value> {
    match &value {
        Value::Decimal(_) => Ok(value),
        Value::Integer(i) => Ok(Value::Decimal(Decimal::from(*i))),
        Value::Double(d) => Decimal::from_f64(*d)
            .map(Value::Decimal)
            .ok_or_else(|| invalid("decimal", &value)),
        Value::String(s) => Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|_| invalid("decimal", &value)),
        _ => Err(invalid("decimal", &value)),
    }
}

fn bounded(type_name: &str, value: Value, min: i64, max: i64) -> Result<Value> {
    let integer = match &value {
        Value::Integer(i) => Some(*i),
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match integer {
        Some(i) if (min..=max).contains(&i) => Ok(Value::Integer(i)),
        _ => Err(invalid(type_name, &value)),
    }
}

fn to_integer(value: Value) -> Result<Value> {
    bounded("integer", value, i64::MIN, i64::MAX)
}

fn to_int(value: Value) -> Result<Value> {
    bounded("int", value, i32::MIN as i64, i32::MAX as i64)
}

fn to_short(value: Value) -> Result<Value> {
    bounded("short", value, i16::MIN as i64, i16::MAX as i64)
}

fn to_byte(value: Value) -> Result<Value> {
    bounded("byte", value, i8::MIN as i64, i8::MAX as i64)
}

fn to_non_negative(value: Value) -> Result<Value> {
    bounded("nonNegativeInteger", value, 0, i64::MAX)
}

fn to_positive(value: Value) -> Result<Value> {
    bounded("positiveInteger", value, 1, i64::MAX)
}

fn to_non_positive(value: Value) -> Result<Value> {
    bounded("nonPositiveInteger", value, i64::MIN, 0)
}

fn to_negative(value: Value) -> Result<Value> {
    bounded("negativeInteger", value, i64::MIN, -1)
}

fn to_unsigned_int(value: Value) -> Result<Value> {
    bounded("unsignedInt", value, 0, u32::MAX as i64)
}

fn to_unsigned_short(value: Value) -> Result<Value> {
    bounded("unsignedShort", value, 0, u16::MAX as i64)
}

fn to_unsigned_byte(value: Value) -> Result<Value> {
    bounded("unsignedByte", value, 0, u8::MAX as i64)
}

fn to_double(value: Value) -> Result<Value> {
    match &value {
        Value::Double(_) => Ok(value),
        Value::Integer(i) => Ok(Value::Double(*i as f64)),
        Value::Decimal(d) => d.to_f64().map(Value::Double).ok_or_else(|| invalid("double", &value)),
        Value::String(s) => match s.trim() {
            "INF" | "+INF" => Ok(Value::Double(f64::INFINITY)),
            "-INF" => Ok(Value::Double(f64::NEG_INFINITY)),
            "NaN" => Ok(Value::Double(f64::NAN)),
            other => other
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| invalid("double", &value)),
        },
        _ => Err(invalid("double", &value)),
    }
}

fn strip_zone(text: &str, from: usize) -> &str {
    let text = text.trim();
    let text = text.strip_suffix('Z').unwrap_or(text);
    match text.get(from..).and_then(|rest| rest.find(['+', '-'])) {
        Some(offset) => &text[..from + offset],
        None => text,
    }
}

fn to_date(value: Value) -> Result<Value> {
    match &value {
        Value::Date(_) => Ok(value),
        Value::DateTime(dt) => Ok(Value::Date(dt.date_naive())),
        Value::String(s) => NaiveDate::parse_from_str(strip_zone(s, 8), "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| invalid("date", &value)),
        _ => Err(invalid("date", &value)),
    }
}

fn to_date_time(value: Value) -> Result<Value> {
    match &value {
        Value::DateTime(_) => Ok(value),
        Value::String(s) => parse_date_time(s.trim()).map(Value::DateTime),
        _ => Err(invalid("dateTime", &value)),
    }
}

fn to_time(value: Value) -> Result<Value> {
    match &value {
        Value::Time(_) => Ok(value),
        Value::String(s) => NaiveTime::parse_from_str(strip_zone(s, 6), "%H:%M:%S%.f")
            .map(Value::Time)
            .map_err(|_| invalid("time", &value)),
        _ => Err(invalid("time", &value)),
    }
}

fn to_base64(value: Value) -> Result<Value> {
    match &value {
        Value::Bytes(_) => Ok(value),
        Value::String(s) => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map(Value::Bytes)
                .map_err(|_| invalid("base64Binary", &value))
        }
        _ => Err(invalid("base64Binary", &value)),
    }
}

fn to_hex(value: Value) -> Result<Value> {
    match &value {
        Value::Bytes(_) => Ok(value),
        Value::String(s) => {
            let s = s.trim();
            if s.len() % 2 != 0 {
                return Err(invalid("hexBinary", &value));
            }
            (0..s.len())
                .step_by(2)
                .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Bytes)
                .ok_or_else(|| invalid("hexBinary", &value))
        }
        _ => Err(invalid("hexBinary", &value)),
    }
}

fn format_hex(value: &Value) -> Option<String> {
    match value {
        Value::Bytes(bytes) => Some(bytes.iter().map(|b| format!("{:02X}", b)).collect()),
        _ => None,
    }
}

static XS_BINDINGS: Lazy<Vec<Arc<dyn Binding>>> = Lazy::new(|| {
    let simple = |local: &str, value_type: ValueType, convert: Convert| -> Arc<dyn Binding> {
        Arc::new(SimpleTypeBinding::new(local, value_type, convert))
    };
    vec![
        Arc::new(AnyTypeBinding),
        Arc::new(AnySimpleTypeBinding),
        simple("string", ValueType::String, identity),
        simple("normalizedString", ValueType::String, to_normalized),
        simple("token", ValueType::String, to_token),
        simple("boolean", ValueType::Bool, to_boolean),
        simple("decimal", ValueType::Decimal, to_decimal),
        simple("integer", ValueType::Integer, to_integer),
        simple("long", ValueType::Integer, to_integer),
        simple("int", ValueType::Integer, to_int),
        simple("short", ValueType::Integer, to_short),
        simple("byte", ValueType::Integer, to_byte),
        simple("nonNegativeInteger", ValueType::Integer, to_non_negative),
        simple("positiveInteger", ValueType::Integer, to_positive),
        simple("nonPositiveInteger", ValueType::Integer, to_non_positive),
        simple("negativeInteger", ValueType::Integer, to_negative),
        simple("unsignedLong", ValueType::Integer, to_non_negative),
        simple("unsignedInt", ValueType::Integer, to_unsigned_int),
        simple("unsignedShort", ValueType::Integer, to_unsigned_short),
        simple("unsignedByte", ValueType::Integer, to_unsigned_byte),
        simple("double", ValueType::Double, to_double),
        simple("float", ValueType::Double, to_double),
        simple("date", ValueType::Date, to_date),
        simple("dateTime", ValueType::DateTime, to_date_time),
        simple("time", ValueType::Time, to_time),
        simple("base64Binary", ValueType::Bytes, to_base64),
        Arc::new(SimpleTypeBinding::new("hexBinary", ValueType::Bytes, to_hex).with_format(format_hex)),
    ]
});

/// Shared instances of the built-in bindings
pub fn xs_bindings() -> &'static [Arc<dyn Binding>] {
    &XS_BINDINGS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ChildNode;

    fn run(chain: &[&str], text: &str) -> Result<Value> {
        let mut node = Node::new(QName::local("v"));
        node.text = Some(text.to_string());
        let mut value = Value::String(text.to_string());
        for local in chain {
            let binding = xs_bindings()
                .iter()
                .find(|b| b.target() == xs(local))
                .unwrap();
            value = binding.parse(&node, value)?;
        }
        Ok(value)
    }

    #[test]
    fn test_integer_chain() {
        let value = run(&["anyType", "anySimpleType", "decimal", "integer", "long", "int"], " 42 ").unwrap();
        assert_eq!(value, Value::Integer(42));
        assert!(run(&["decimal", "integer", "long", "int", "short", "byte"], "300").is_err());
        assert!(run(&["decimal", "integer"], "1.5").is_err());
    }

    #[test]
    fn test_scalars() {
        assert_eq!(run(&["boolean"], "1").unwrap(), Value::Bool(true));
        assert_eq!(run(&["double"], "-INF").unwrap(), Value::Double(f64::NEG_INFINITY));
        assert_eq!(
            run(&["date"], "2024-02-29Z").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            run(&["time"], "10:30:00+02:00").unwrap(),
            Value::Time(NaiveTime::from_hms_opt(10, 30, 0).unwrap())
        );
        assert_eq!(run(&["hexBinary"], "0fA0").unwrap(), Value::Bytes(vec![0x0f, 0xa0]));
        assert_eq!(run(&["token"], "  a \n b ").unwrap(), Value::String("a b".into()));
        assert!(run(&["boolean"], "yes").is_err());
    }

    #[test]
    fn test_hex_format() {
        let hex = xs_bindings().iter().find(|b| b.target() == xs("hexBinary")).unwrap();
        let text = hex
            .encode_text(&Value::Bytes(vec![0xca, 0xfe]), Some("yv4=".into()))
            .unwrap();
        assert_eq!(text.as_deref(), Some("CAFE"));
    }

    #[test]
    fn test_any_type_builds_record() {
        let mut node = Node::new(QName::namespaced("urn:test", "Root"));
        node.type_name = Some(QName::namespaced("urn:test", "RootType"));
        node.attributes.insert(QName::local("id"), Value::String("A1".into()));
        for text in ["x", "y"] {
            node.children.push(ChildNode {
                name: QName::namespaced("urn:test", "Item"),
                value: Value::String(text.into()),
                multiple: true,
            });
        }
        let value = AnyTypeBinding.parse(&node, Value::Null).unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.class().name().local_name, "RootType");
        assert_eq!(record.get("id"), Some(&Value::String("A1".into())));
        assert_eq!(
            record.get("Item"),
            Some(&Value::List(vec![Value::String("x".into()), Value::String("y".into())]))
        );
    }

    #[test]
    fn test_any_type_keeps_simple_values() {
        let node = Node::new(QName::local("Item"));
        let value = AnyTypeBinding.parse(&node, Value::String("x".into())).unwrap();
        assert_eq!(value, Value::String("x".into()));
    }
}
