// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// codec.rs:

//! Conversions between primitive values, their textual wire form and the
//! little-endian byte pattern stored in the arena.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CodecError {
    #[error("unsupported type `{0}`")]
    UnsupportedType(String),
    #[error("`{text}` is not a valid {tag}")]
    Malformed { tag: TypeTag, text: String },
    #[error("{tag} needs {needed} bytes, got {got}")]
    ShortBuffer {
        tag: TypeTag,
        needed: usize,
        got: usize,
    },
}

// T Y P E   T A G

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Char,
}

impl TypeTag {
    pub const ALL: [TypeTag; 8] = [
        TypeTag::I32,
        TypeTag::I64,
        TypeTag::U32,
        TypeTag::U64,
        TypeTag::F32,
        TypeTag::F64,
        TypeTag::Bool,
        TypeTag::Char,
    ];

    /// Width of the native byte pattern written into the arena.
    pub fn size(self) -> usize {
        match self {
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 | TypeTag::Char => 4,
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => 8,
            TypeTag::Bool => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::U32 => "u32",
            TypeTag::U64 => "u64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Bool => "bool",
            TypeTag::Char => "char",
        }
    }
}

impl FromStr for TypeTag {
    type Err = CodecError;

    // Single-letter aliases are the mangled names C++ `typeid` reports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "i32" | "int" | "i" => Ok(TypeTag::I32),
            "i64" | "long" | "long long" | "l" | "x" => Ok(TypeTag::I64),
            "u32" | "unsigned int" | "unsigned" | "j" => Ok(TypeTag::U32),
            "u64" | "unsigned long" | "unsigned long long" | "m" | "y" => Ok(TypeTag::U64),
            "f32" | "float" | "f" => Ok(TypeTag::F32),
            "f64" | "double" | "d" => Ok(TypeTag::F64),
            "bool" | "b" => Ok(TypeTag::Bool),
            "char" | "c" => Ok(TypeTag::Char),
            other => Err(CodecError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// V A L U E

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
}

fn parse<T: FromStr>(tag: TypeTag, text: &str) -> Result<T, CodecError> {
    text.trim().parse().map_err(|_| CodecError::Malformed {
        tag,
        text: text.to_string(),
    })
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::I32(_) => TypeTag::I32,
            Value::I64(_) => TypeTag::I64,
            Value::U32(_) => TypeTag::U32,
            Value::U64(_) => TypeTag::U64,
            Value::F32(_) => TypeTag::F32,
            Value::F64(_) => TypeTag::F64,
            Value::Bool(_) => TypeTag::Bool,
            Value::Char(_) => TypeTag::Char,
        }
    }

    /// Parses the wire text of a value of type `tag`.
    pub fn parse(tag: TypeTag, text: &str) -> Result<Self, CodecError> {
        Ok(match tag {
            TypeTag::I32 => Value::I32(parse(tag, text)?),
            TypeTag::I64 => Value::I64(parse(tag, text)?),
            TypeTag::U32 => Value::U32(parse(tag, text)?),
            TypeTag::U64 => Value::U64(parse(tag, text)?),
            TypeTag::F32 => Value::F32(parse(tag, text)?),
            TypeTag::F64 => Value::F64(parse(tag, text)?),
            TypeTag::Bool => match text.trim() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => {
                    return Err(CodecError::Malformed {
                        tag,
                        text: text.to_string(),
                    })
                }
            },
            // no trimming: a single space is a valid char
            TypeTag::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => {
                        return Err(CodecError::Malformed {
                            tag,
                            text: text.to_string(),
                        })
                    }
                }
            }
        })
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::U64(v) => v.to_le_bytes().to_vec(),
            Value::F32(v) => v.to_le_bytes().to_vec(),
            Value::F64(v) => v.to_le_bytes().to_vec(),
            Value::Bool(v) => vec![v as u8],
            Value::Char(v) => (v as u32).to_le_bytes().to_vec(),
        }
    }

    /// Reads a value of type `tag` from the start of `bytes`; trailing bytes
    /// (a reused block larger than the type) are ignored.
    pub fn from_le_bytes(tag: TypeTag, bytes: &[u8]) -> Result<Self, CodecError> {
        let needed = tag.size();
        let src = bytes.get(..needed).ok_or(CodecError::ShortBuffer {
            tag,
            needed,
            got: bytes.len(),
        })?;
        let mut buf = [0u8; 8];
        buf[..needed].copy_from_slice(src);
        let word = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Ok(match tag {
            TypeTag::I32 => Value::I32(word as i32),
            TypeTag::U32 => Value::U32(word),
            TypeTag::F32 => Value::F32(f32::from_bits(word)),
            TypeTag::I64 => Value::I64(i64::from_le_bytes(buf)),
            TypeTag::U64 => Value::U64(u64::from_le_bytes(buf)),
            TypeTag::F64 => Value::F64(f64::from_le_bytes(buf)),
            TypeTag::Bool => Value::Bool(buf[0] != 0),
            TypeTag::Char => Value::Char(char::from_u32(word).ok_or(CodecError::Malformed {
                tag,
                text: format!("{word:#x}"),
            })?),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
        }
    }
}

/// Encodes a value to its canonical wire text.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Decodes wire text according to a textual type tag.
pub fn decode(type_tag: &str, text: &str) -> Result<Value, CodecError> {
    Value::parse(type_tag.parse()?, text)
}

// P R I M I T I V E

/// Rust types that can live in a remote block.
pub trait Primitive: Copy + Send + 'static {
    const TAG: TypeTag;

    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const TAG: TypeTag = TypeTag::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

primitive! {
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    char => Char,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::I32(0),
            Value::I32(1234),
            Value::I32(i32::MIN),
            Value::I64(-9_007_199_254_740_993),
            Value::U32(u32::MAX),
            Value::U64(u64::MAX),
            Value::F32(3.25),
            Value::F32(-0.1),
            Value::F64(std::f64::consts::PI),
            Value::F64(1e-300),
            Value::Bool(true),
            Value::Bool(false),
            Value::Char('x'),
            Value::Char(' '),
            Value::Char('ñ'),
        ]
    }

    #[test]
    fn test_text_round_trip() -> Result<(), CodecError> {
        for value in samples() {
            let text = encode(&value);
            let back = decode(value.tag().name(), &text)?;
            assert_eq!(value, back, "text round trip of {:?} via {:?}", value, text);
        }
        Ok(())
    }

    #[test]
    fn test_every_tag_named_and_sampled() -> Result<(), CodecError> {
        let samples = samples();
        for tag in TypeTag::ALL {
            assert_eq!(tag.name().parse::<TypeTag>()?, tag);
            assert!(samples.iter().any(|value| value.tag() == tag), "no sample for {tag}");
        }
        Ok(())
    }

    #[test]
    fn test_bytes_round_trip() -> Result<(), CodecError> {
        for value in samples() {
            let bytes = value.to_le_bytes();
            assert_eq!(bytes.len(), value.tag().size());
            assert_eq!(Value::from_le_bytes(value.tag(), &bytes)?, value);
        }
        Ok(())
    }

    #[test]
    fn test_aliases() -> Result<(), CodecError> {
        assert_eq!("int".parse::<TypeTag>()?, TypeTag::I32);
        assert_eq!("i".parse::<TypeTag>()?, TypeTag::I32);
        assert_eq!("unsigned long".parse::<TypeTag>()?, TypeTag::U64);
        assert_eq!("double".parse::<TypeTag>()?, TypeTag::F64);
        assert_eq!(decode("int", "1234")?, Value::I32(1234));
        assert_eq!(decode("bool", "1")?, Value::Bool(true));
        Ok(())
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(
            decode("string", "hi"),
            Err(CodecError::UnsupportedType("string".into()))
        );
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            decode("i32", "12x"),
            Err(CodecError::Malformed { tag: TypeTag::I32, .. })
        ));
        assert!(matches!(
            decode("char", "ab"),
            Err(CodecError::Malformed { tag: TypeTag::Char, .. })
        ));
        assert!(matches!(
            decode("u32", "-1"),
            Err(CodecError::Malformed { tag: TypeTag::U32, .. })
        ));
    }

    #[test]
    fn test_wider_buffer_reads_prefix() -> Result<(), CodecError> {
        let mut bytes = Value::I32(-7).to_le_bytes();
        bytes.extend_from_slice(&[0xff; 12]);
        assert_eq!(Value::from_le_bytes(TypeTag::I32, &bytes)?, Value::I32(-7));
        assert!(matches!(
            Value::from_le_bytes(TypeTag::I64, &bytes[..4]),
            Err(CodecError::ShortBuffer { needed: 8, got: 4, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_primitive_mapping() {
        assert_eq!(<f64 as Primitive>::TAG, TypeTag::F64);
        assert_eq!(42u64.into_value(), Value::U64(42));
        assert_eq!(i32::from_value(Value::I32(5)), Some(5));
        assert_eq!(i32::from_value(Value::I64(5)), None);
    }
}
