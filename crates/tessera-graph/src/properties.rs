//! Declared property values to flat database-primitive maps.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tessera_core::{PropertyDescriptor, PropertyKind, PropertyValue, TesseraError};

/// Separator between a multi-key field name and its part name.
pub const MULTI_KEY_SEPARATOR: &str = "____";

/// What to do with a declared property the entity leaves unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absent {
    /// Leave the key out (creation).
    Omit,
    /// Write an explicit null so a `+=` merge clears the stored value (update).
    Null,
}

fn is_list(value: &PropertyValue) -> bool {
    matches!(
        value,
        PropertyValue::List(_) | PropertyValue::Set(_) | PropertyValue::Tuple(_)
    )
}

/// Coerce one value to a database primitive or homogeneous primitive list.
pub fn coerce(property: &str, value: &PropertyValue) -> Result<Value, TesseraError> {
    match value {
        PropertyValue::List(items) | PropertyValue::Tuple(items) => coerce_list(property, items),
        PropertyValue::Set(items) => {
            let mut coerced = match coerce_list(property, items)? {
                Value::Array(values) => values,
                other => return Ok(other),
            };
            // Sets have no order; sort on the serialized form for stable output.
            coerced.sort_by_key(|v| v.to_string());
            coerced.dedup();
            Ok(Value::Array(coerced))
        }
        PropertyValue::MultiKey(_) => Err(TesseraError::coercion(
            property,
            "multi-key value in a single-valued property",
        )),
        scalar => coerce_scalar(property, scalar),
    }
}

fn coerce_scalar(property: &str, value: &PropertyValue) -> Result<Value, TesseraError> {
    Ok(match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Bool(b) => Value::Bool(*b),
        PropertyValue::Int(i) => Value::from(*i),
        PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| TesseraError::coercion(property, "non-finite float"))?,
        PropertyValue::String(s) | PropertyValue::Uri(s) => Value::String(s.clone()),
        PropertyValue::Id(id) => Value::String(id.to_string()),
        PropertyValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        PropertyValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        PropertyValue::List(_)
        | PropertyValue::Set(_)
        | PropertyValue::Tuple(_)
        | PropertyValue::MultiKey(_) => {
            return Err(TesseraError::coercion(property, "nested collection"));
        }
    })
}

fn coerce_list(property: &str, items: &[PropertyValue]) -> Result<Value, TesseraError> {
    let values = items
        .iter()
        .map(|item| coerce_scalar(property, item))
        .collect::<Result<Vec<_>, _>>()?;

    let mut kinds = values
        .iter()
        .filter(|v| !v.is_null())
        .map(json_kind)
        .collect::<Vec<_>>();
    kinds.dedup();
    if kinds.len() > 1 {
        return Err(TesseraError::coercion(property, "list mixes value types"));
    }
    Ok(Value::Array(values))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Serialize one declared property into `out`.
///
/// With [`Absent::Null`], declared multi-key parts the value leaves out are
/// written as null so a `+=` merge clears them.
pub fn serialize_property(
    descriptor: &PropertyDescriptor,
    value: &PropertyValue,
    absent: Absent,
    out: &mut Map<String, Value>,
) -> Result<(), TesseraError> {
    let name = descriptor.name.as_str();
    match descriptor.kind {
        PropertyKind::Literal => {
            if matches!(value, PropertyValue::MultiKey(_)) {
                return Err(TesseraError::coercion(name, "expected a single value"));
            }
            out.insert(name.to_string(), coerce(name, value)?);
        }
        PropertyKind::List => {
            if !is_list(value) && !value.is_null() {
                return Err(TesseraError::coercion(name, "expected a list, set, or tuple"));
            }
            out.insert(name.to_string(), coerce(name, value)?);
        }
        PropertyKind::MultiKey => match value {
            PropertyValue::MultiKey(mk) => {
                out.insert(multi_key_name(name, "value"), coerce(name, &mk.value)?);
                for (part, part_value) in &mk.parts {
                    if !descriptor.parts.is_empty() && !descriptor.parts.contains(part) {
                        return Err(TesseraError::coercion(
                            name,
                            format!("undeclared part '{part}'"),
                        ));
                    }
                    out.insert(multi_key_name(name, part), coerce(name, part_value)?);
                }
                if absent == Absent::Null {
                    for part in &descriptor.parts {
                        if !mk.parts.contains_key(part) {
                            out.insert(multi_key_name(name, part), Value::Null);
                        }
                    }
                }
            }
            PropertyValue::Null => insert_absent(descriptor, out),
            _ => return Err(TesseraError::coercion(name, "expected a multi-key value")),
        },
    }
    Ok(())
}

/// `<field>____<part>`.
pub fn multi_key_name(field: &str, part: &str) -> String {
    format!("{field}{MULTI_KEY_SEPARATOR}{part}")
}

fn insert_absent(descriptor: &PropertyDescriptor, out: &mut Map<String, Value>) {
    match descriptor.kind {
        PropertyKind::MultiKey => {
            out.insert(multi_key_name(&descriptor.name, "value"), Value::Null);
            for part in &descriptor.parts {
                out.insert(multi_key_name(&descriptor.name, part), Value::Null);
            }
        }
        _ => {
            out.insert(descriptor.name.clone(), Value::Null);
        }
    }
}

/// Serialize every declared property of an entity.
///
/// Values for undeclared names are rejected. Null values are treated as
/// absent.
pub fn serialize_properties(
    owner: &str,
    descriptors: &[PropertyDescriptor],
    values: &BTreeMap<String, PropertyValue>,
    absent: Absent,
) -> Result<Map<String, Value>, TesseraError> {
    if let Some(unknown) = values
        .keys()
        .find(|name| !descriptors.iter().any(|d| &d.name == *name))
    {
        return Err(TesseraError::invalid_entity(
            owner,
            format!("undeclared property '{unknown}'"),
        ));
    }

    let mut out = Map::new();
    for descriptor in descriptors {
        match values.get(&descriptor.name) {
            Some(value) if !value.is_null() => serialize_property(descriptor, value, absent, &mut out)?,
            _ if absent == Absent::Null => insert_absent(descriptor, &mut out),
            _ => {}
        }
    }
    Ok(out)
}

/// The JSON form of a value inside an entity view.
///
/// Multi-key values stay nested (`{"value": .., "<part>": ..}`).
pub fn view_value(property: &str, value: &PropertyValue) -> Result<Value, TesseraError> {
    match value {
        PropertyValue::MultiKey(mk) => {
            let mut out = Map::new();
            out.insert("value".to_string(), coerce(property, &mk.value)?);
            for (part, part_value) in &mk.parts {
                out.insert(part.clone(), coerce(property, part_value)?);
            }
            Ok(Value::Object(out))
        }
        other => coerce(property, other),
    }
}
