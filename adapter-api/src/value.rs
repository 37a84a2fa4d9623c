use crate::error::Error;
use std::convert::TryFrom;
use std::fmt;

/// A typed device value. Every reading produced by a driver, and every
/// setting accepted from the platform, is one of these variants.
///
/// `Binary` owns its byte buffer; the declared length is simply
/// `buf.len()` but is kept explicit on the wire (see `Reading`) so a
/// partial read downstream can be detected without re-deriving it from
/// the buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
}

impl Value {
    /// Name of the variant, as used in `DeviceResource.properties.value.type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
        }
    }

    /// `true` for every variant the transform engine treats as
    /// numeric (everything except `String` and `Binary`).
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::String(_) | Value::Binary(_))
    }

    /// `true` for the variants `mask`/`shift` apply to.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Value::UInt8(_)
                | Value::UInt16(_)
                | Value::UInt32(_)
                | Value::UInt64(_)
                | Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
        )
    }

    /// Widens any numeric variant to `f64` for the transform engine.
    /// Returns `None` for `String`/`Binary`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            Value::UInt8(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::UInt64(v) => Some(v as f64),
            Value::Int8(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::Int64(v) => Some(v as f64),
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::String(_) | Value::Binary(_) => None,
        }
    }

    /// Widens any integral variant to `i128` (wide enough to hold
    /// `u64::MAX` and `i64::MIN` alike) for mask/shift arithmetic.
    /// Returns `None` for non-integral variants.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::UInt8(v) => Some(v as i128),
            Value::UInt16(v) => Some(v as i128),
            Value::UInt32(v) => Some(v as i128),
            Value::UInt64(v) => Some(v as i128),
            Value::Int8(v) => Some(v as i128),
            Value::Int16(v) => Some(v as i128),
            Value::Int32(v) => Some(v as i128),
            Value::Int64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Reconstructs a value of the same variant as `self` from a
    /// widened `f64`, saturating on overflow for integral types.
    pub fn from_f64_like(&self, v: f64) -> Value {
        match self {
            Value::Bool(_) => Value::Bool(v != 0.0),
            Value::UInt8(_) => Value::UInt8(saturate_u(v, u8::MAX as f64)),
            Value::UInt16(_) => Value::UInt16(saturate_u(v, u16::MAX as f64)),
            Value::UInt32(_) => Value::UInt32(saturate_u(v, u32::MAX as f64)),
            Value::UInt64(_) => Value::UInt64(saturate_u(v, u64::MAX as f64)),
            Value::Int8(_) => Value::Int8(saturate_i(v, i8::MIN as f64, i8::MAX as f64)),
            Value::Int16(_) => Value::Int16(saturate_i(v, i16::MIN as f64, i16::MAX as f64)),
            Value::Int32(_) => Value::Int32(saturate_i(v, i32::MIN as f64, i32::MAX as f64)),
            Value::Int64(_) => Value::Int64(saturate_i(v, i64::MIN as f64, i64::MAX as f64)),
            Value::Float32(_) => Value::Float32(v as f32),
            Value::Float64(_) => Value::Float64(v),
            Value::String(s) => Value::String(s.clone()),
            Value::Binary(b) => Value::Binary(b.clone()),
        }
    }

    /// Reconstructs a value of the same variant as `self` from a
    /// widened `i128`, saturating on overflow. Used for mask/shift,
    /// which are only ever applied to integral types.
    pub fn from_i128_like(&self, v: i128) -> Value {
        match self {
            Value::UInt8(_) => Value::UInt8(v.clamp(0, u8::MAX as i128) as u8),
            Value::UInt16(_) => Value::UInt16(v.clamp(0, u16::MAX as i128) as u16),
            Value::UInt32(_) => Value::UInt32(v.clamp(0, u32::MAX as i128) as u32),
            Value::UInt64(_) => Value::UInt64(v.clamp(0, u64::MAX as i128) as u64),
            Value::Int8(_) => Value::Int8(v.clamp(i8::MIN as i128, i8::MAX as i128) as i8),
            Value::Int16(_) => Value::Int16(v.clamp(i16::MIN as i128, i16::MAX as i128) as i16),
            Value::Int32(_) => Value::Int32(v.clamp(i32::MIN as i128, i32::MAX as i128) as i32),
            Value::Int64(_) => Value::Int64(v.clamp(i64::MIN as i128, i64::MAX as i128) as i64),
            other => other.clone(),
        }
    }
}

fn saturate_u(v: f64, max: f64) -> u64 {
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, max) as u64
    }
}

fn saturate_i(v: f64, min: f64, max: f64) -> i64 {
    if v.is_nan() {
        0
    } else {
        v.clamp(min, max) as i64
    }
}

// The above helpers return the widest integer type and then get
// narrowed by the `as u8`/`as i8` casts in `from_f64_like`; this is
// safe because the clamp already bounded the value to the narrower
// range.

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", with_decimal_point(*v as f64)),
            Value::Float64(v) => write!(f, "{}", with_decimal_point(*v)),
            Value::String(v) => write!(f, "{}", v),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Rust's own `f64` `Display` drops the fractional part entirely for a
/// whole number (`50.0` prints as `"50"`), which is indistinguishable
/// from an integer reading on the wire. Readings need that distinction,
/// so whole-valued floats keep a trailing `.0`.
fn with_decimal_point(v: f64) -> String {
    let s = v.to_string();
    if s.contains('.') || s.contains('e') || s.contains("NaN") || s.contains("inf") {
        s
    } else {
        format!("{}.0", s)
    }
}

macro_rules! value_conv {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        }

        impl TryFrom<Value> for $t {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                if let Value::$variant(v) = value {
                    Ok(v)
                } else {
                    Err(Error::TypeError)
                }
            }
        }
    };
}

value_conv!(bool, Bool);
value_conv!(u8, UInt8);
value_conv!(u16, UInt16);
value_conv!(u32, UInt32);
value_conv!(u64, UInt64);
value_conv!(i8, Int8);
value_conv!(i16, Int16);
value_conv!(i32, Int32);
value_conv!(i64, Int64);
value_conv!(f32, Float32);
value_conv!(f64, Float64);
value_conv!(String, String);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Binary(v) = value {
            Ok(v)
        } else {
            Err(Error::TypeError)
        }
    }
}

/// Parses a string into a `Value` of the variant named by `type_name`
/// (one of the strings returned by [`Value::type_name`]). Used by the
/// dispatcher when coercing a `PUT` body's string values into the
/// target resource's declared type.
pub fn parse_as(type_name: &str, s: &str) -> Result<Value, Error> {
    let bad = || Error::InvalidArg(format!("cannot parse '{}' as {}", s, type_name));

    match type_name {
        "Bool" => s.parse::<bool>().map(Value::Bool).map_err(|_| bad()),
        "UInt8" => s.parse::<u8>().map(Value::UInt8).map_err(|_| bad()),
        "UInt16" => s.parse::<u16>().map(Value::UInt16).map_err(|_| bad()),
        "UInt32" => s.parse::<u32>().map(Value::UInt32).map_err(|_| bad()),
        "UInt64" => s.parse::<u64>().map(Value::UInt64).map_err(|_| bad()),
        "Int8" => s.parse::<i8>().map(Value::Int8).map_err(|_| bad()),
        "Int16" => s.parse::<i16>().map(Value::Int16).map_err(|_| bad()),
        "Int32" => s.parse::<i32>().map(Value::Int32).map_err(|_| bad()),
        "Int64" => s.parse::<i64>().map(Value::Int64).map_err(|_| bad()),
        "Float32" => s.parse::<f32>().map(Value::Float32).map_err(|_| bad()),
        "Float64" => s.parse::<f64>().map(Value::Float64).map_err(|_| bad()),
        "String" => Ok(Value::String(s.to_owned())),
        "Binary" => base64_decode(s).map(Value::Binary).ok_or_else(bad),
        _ => Err(Error::InvalidArg(format!("unknown value type '{}'", type_name))),
    }
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_scalar() {
        assert_eq!(format!("{}", Value::Int16(500)), "500");
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Float64(50.0)), "50.0");
    }

    #[test]
    fn numeric_roundtrip_through_f64() {
        let v = Value::Int16(500);
        let widened = v.as_f64().unwrap();
        let narrowed = v.from_f64_like(widened);
        assert_eq!(narrowed, Value::Int16(500));
    }

    #[test]
    fn saturates_on_overflow() {
        let v = Value::UInt8(0);
        assert_eq!(v.from_f64_like(1000.0), Value::UInt8(255));
        assert_eq!(v.from_f64_like(-10.0), Value::UInt8(0));

        let v = Value::Int8(0);
        assert_eq!(v.from_i128_like(1000), Value::Int8(127));
        assert_eq!(v.from_i128_like(-1000), Value::Int8(-128));
    }

    #[test]
    fn parse_as_roundtrips() {
        assert_eq!(parse_as("Int16", "500").unwrap(), Value::Int16(500));
        assert_eq!(parse_as("Bool", "true").unwrap(), Value::Bool(true));
        assert!(parse_as("Int16", "not-a-number").is_err());
    }

    #[test]
    fn is_integral_excludes_float_and_text() {
        assert!(Value::Int32(0).is_integral());
        assert!(!Value::Float32(0.0).is_integral());
        assert!(!Value::String(String::new()).is_integral());
        assert!(!Value::Binary(vec![]).is_integral());
    }
}
