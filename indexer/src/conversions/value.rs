use crate::bail;
use crate::error::{ErrorKind, IndexerResult};
use crate::types::{AttributeValue, FieldType};

/// Parses a stored boolean. Only `"true"` and `"1"` are true, anything else is false.
pub fn parse_bool(raw: &str) -> bool {
    raw == "true" || raw == "1"
}

pub fn parse_int(raw: &str) -> IndexerResult<i64> {
    Ok(raw.parse::<i64>()?)
}

/// Parses a stored double, rejecting values that cannot be represented in a JSON document.
pub fn parse_double(raw: &str) -> IndexerResult<f64> {
    let value = raw.parse::<f64>()?;
    if !value.is_finite() {
        bail!(
            ErrorKind::ConversionError,
            "Double value is not finite",
            format!("Received value '{raw}'")
        );
    }

    Ok(value)
}

/// Coerces a raw stored value to the slot of its declared field type.
///
/// Booleans and text never fail. Numeric values that do not parse return a
/// [`ErrorKind::ConversionError`].
pub fn coerce_value(field_type: FieldType, raw: &str) -> IndexerResult<AttributeValue> {
    let value = match field_type {
        FieldType::Bool => AttributeValue::Bool(parse_bool(raw)),
        FieldType::Int => AttributeValue::Int(parse_int(raw)?),
        FieldType::Double => AttributeValue::Double(parse_double(raw)?),
        FieldType::Text => AttributeValue::Text(raw.to_string()),
    };

    Ok(value)
}
