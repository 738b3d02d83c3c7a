//! Core scalar types for SEG-Y headers and samples

use crate::error::{Result, SegyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-width numeric encodings used by SEG-Y headers, samples and raw recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum NumericKind {
    /// Signed 16-bit integer
    Int16 = 0,
    /// Signed 32-bit integer
    Int32 = 1,
    /// Unsigned 16-bit integer
    UInt16 = 2,
    /// Unsigned 32-bit integer
    UInt32 = 3,
    /// Signed 8-bit integer
    Int8 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// IEEE 754 32-bit float
    Float32 = 6,
    /// IBM System/360 32-bit hexadecimal float
    Ibm32 = 7,
}

impl NumericKind {
    /// Size in bytes of one element
    pub fn size_in_bytes(&self) -> usize {
        match self {
            NumericKind::Int8 | NumericKind::UInt8 => 1,
            NumericKind::Int16 | NumericKind::UInt16 => 2,
            NumericKind::Int32 | NumericKind::UInt32 | NumericKind::Float32 | NumericKind::Ibm32 => 4,
        }
    }

    /// Check if this is a floating point kind
    pub fn is_float(&self) -> bool {
        matches!(self, NumericKind::Float32 | NumericKind::Ibm32)
    }

    /// Check if this is an integer kind
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Canonical name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            NumericKind::Int16 => "int16",
            NumericKind::Int32 => "int32",
            NumericKind::UInt16 => "uint16",
            NumericKind::UInt32 => "uint32",
            NumericKind::Int8 => "int8",
            NumericKind::UInt8 => "uint8",
            NumericKind::Float32 => "float32",
            NumericKind::Ibm32 => "ibm32",
        }
    }

    /// Parse any accepted alias.
    ///
    /// Accepts the canonical names plus the struct-style codes and C names
    /// found in older SEG-Y tooling (`l`, `long`, `h`, `short`, `f`, `float`, ...).
    pub fn from_alias(alias: &str) -> Result<Self> {
        let kind = match alias.trim() {
            "int32" | "l" | "long" | "i4" => NumericKind::Int32,
            "uint32" | "L" | "ulong" | "u4" => NumericKind::UInt32,
            "int16" | "h" | "short" | "i2" => NumericKind::Int16,
            "uint16" | "H" | "ushort" | "u2" => NumericKind::UInt16,
            "int8" | "b" | "char" | "i1" => NumericKind::Int8,
            "uint8" | "B" | "uchar" | "u1" => NumericKind::UInt8,
            "float32" | "f" | "float" | "f4" | "ieee" => NumericKind::Float32,
            "ibm32" | "ibm" => NumericKind::Ibm32,
            other => return Err(SegyError::UnsupportedNumericKind(other.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericKind {
    type Err = SegyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_alias(s)
    }
}

impl TryFrom<String> for NumericKind {
    type Error = SegyError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_alias(&value)
    }
}

impl From<NumericKind> for String {
    fn from(kind: NumericKind) -> Self {
        kind.name().to_string()
    }
}

/// Byte order of an encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Most significant byte first (SEG-Y convention)
    #[default]
    Big,
    /// Least significant byte first (raw recorder output)
    Little,
}

/// A decoded scalar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }

    /// Integer view; floats are truncated toward zero
    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sizes() {
        assert_eq!(NumericKind::Int8.size_in_bytes(), 1);
        assert_eq!(NumericKind::UInt16.size_in_bytes(), 2);
        assert_eq!(NumericKind::Float32.size_in_bytes(), 4);
        assert_eq!(NumericKind::Ibm32.size_in_bytes(), 4);
    }

    #[test]
    fn test_aliases_share_one_kind() {
        for alias in ["l", "int32", "long"] {
            assert_eq!(NumericKind::from_alias(alias).unwrap(), NumericKind::Int32);
        }
        assert_eq!("f".parse::<NumericKind>().unwrap(), NumericKind::Float32);
        assert_eq!("ibm".parse::<NumericKind>().unwrap(), NumericKind::Ibm32);
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let err = NumericKind::from_alias("int64").unwrap_err();
        assert!(matches!(err, SegyError::UnsupportedNumericKind(_)));
    }

    #[test]
    fn test_kind_serde_uses_names() {
        let json = serde_json::to_string(&NumericKind::Int16).unwrap();
        assert_eq!(json, "\"int16\"");
        let kind: NumericKind = serde_json::from_str("\"short\"").unwrap();
        assert_eq!(kind, NumericKind::Int16);
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::Int(-3).as_f64(), -3.0);
        assert_eq!(Value::Float(2.9).as_i64(), 2);
    }
}
