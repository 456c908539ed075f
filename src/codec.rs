//! Object codec for storing structured values in a single string value.
//!
//! The stored text is `appreg1:` followed by the lowercase hex of one encoded
//! object. An encoded object is a one-byte tag, a little-endian `u32` payload
//! length and the payload itself:
//!
//! | tag    | kind      | payload                          |
//! |--------|-----------|----------------------------------|
//! | `0x01` | `Int`     | `i64` LE                         |
//! | `0x02` | `Float`   | `f64` bits LE                    |
//! | `0x03` | `Bool`    | one byte, `0` or `1`             |
//! | `0x04` | `Str`     | UTF-8 bytes                      |
//! | `0x05` | `Complex` | real then imaginary, `f64` LE    |
//! | `0x06` | `Tuple`   | the encoded elements, in order   |

use std::fmt;
use thiserror::Error;

pub const PREFIX: &str = "appreg1:";

const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_BOOL: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_COMPLEX: u8 = 0x05;
const TAG_TUPLE: u8 = 0x06;

const HEADER_LEN: usize = 5;
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Complex { re: f64, im: f64 },
    Tuple(Vec<Object>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing 'appreg1:' prefix")]
    MissingPrefix,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("unknown tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("truncated input at offset {0}")]
    Truncated(usize),

    #[error("tag 0x{tag:02x} expects {expected} payload bytes, got {actual}")]
    BadLength {
        tag: u8,
        expected: usize,
        actual: usize,
    },

    #[error("invalid bool byte 0x{0:02x}")]
    InvalidBool(u8),

    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,

    #[error("{0} trailing bytes after object")]
    TrailingBytes(usize),

    #[error("nesting deeper than 64 levels")]
    TooDeep,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("nesting deeper than 64 levels")]
    TooDeep,

    #[error("payload of {0} bytes does not fit a u32 length")]
    TooLarge(usize),

    #[error("unsupported value: {0}")]
    Unsupported(String),
}

/// Encode `object` into its stored text form.
///
/// # Errors
///
/// Returns an [`EncodeError`] for objects [`decode`] could not read back:
/// nesting deeper than 64 levels or a payload longer than `u32::MAX` bytes
pub fn encode(object: &Object) -> Result<String, EncodeError> {
    let mut bytes = Vec::new();
    write_object(object, &mut bytes, 0)?;
    Ok(format!("{PREFIX}{}", hex::encode(bytes)))
}

/// Decode the stored text form produced by [`encode`].
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first malformed part of `text`
pub fn decode(text: &str) -> Result<Object, DecodeError> {
    let body = text
        .trim()
        .strip_prefix(PREFIX)
        .ok_or(DecodeError::MissingPrefix)?;
    let bytes = hex::decode(body).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;

    let mut reader = Reader { bytes: &bytes, pos: 0 };
    let object = reader.read_object(0)?;
    match bytes.len() - reader.pos {
        0 => Ok(object),
        n => Err(DecodeError::TrailingBytes(n)),
    }
}

fn write_object(object: &Object, out: &mut Vec<u8>, depth: usize) -> Result<(), EncodeError> {
    if depth > MAX_DEPTH {
        return Err(EncodeError::TooDeep);
    }

    let (tag, payload) = match object {
        Object::Int(v) => (TAG_INT, v.to_le_bytes().to_vec()),
        Object::Float(v) => (TAG_FLOAT, v.to_bits().to_le_bytes().to_vec()),
        Object::Bool(v) => (TAG_BOOL, vec![u8::from(*v)]),
        Object::Str(s) => (TAG_STR, s.as_bytes().to_vec()),
        Object::Complex { re, im } => {
            let mut payload = re.to_bits().to_le_bytes().to_vec();
            payload.extend_from_slice(&im.to_bits().to_le_bytes());
            (TAG_COMPLEX, payload)
        }
        Object::Tuple(items) => {
            let mut payload = Vec::new();
            for item in items {
                write_object(item, &mut payload, depth + 1)?;
            }
            (TAG_TUPLE, payload)
        }
    };

    let len = u32::try_from(payload.len()).map_err(|_| EncodeError::TooLarge(payload.len()))?;
    out.push(tag);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_object(&mut self, depth: usize) -> Result<Object, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        let header = self.take(HEADER_LEN)?;
        let tag = header[0];
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let payload = self.take(len)?;

        match tag {
            TAG_INT => Ok(Object::Int(i64::from_le_bytes(fixed(tag, payload)?))),
            TAG_FLOAT => Ok(Object::Float(f64::from_bits(u64::from_le_bytes(fixed(
                tag, payload,
            )?)))),
            TAG_BOOL => match fixed::<1>(tag, payload)? {
                [0] => Ok(Object::Bool(false)),
                [1] => Ok(Object::Bool(true)),
                [b] => Err(DecodeError::InvalidBool(b)),
            },
            TAG_STR => std::str::from_utf8(payload)
                .map(|s| Object::Str(s.to_owned()))
                .map_err(|_| DecodeError::InvalidUtf8),
            TAG_COMPLEX => {
                let raw: [u8; 16] = fixed(tag, payload)?;
                let (re, im) = raw.split_at(8);
                Ok(Object::Complex {
                    re: f64::from_bits(u64::from_le_bytes(fixed(tag, re)?)),
                    im: f64::from_bits(u64::from_le_bytes(fixed(tag, im)?)),
                })
            }
            TAG_TUPLE => {
                let base = self.pos - payload.len();
                let mut inner = Reader {
                    bytes: payload,
                    pos: 0,
                };
                let mut items = Vec::new();
                while inner.pos < payload.len() {
                    let item = inner
                        .read_object(depth + 1)
                        .map_err(|e| match e {
                            DecodeError::Truncated(at) => DecodeError::Truncated(base + at),
                            other => other,
                        })?;
                    items.push(item);
                }
                Ok(Object::Tuple(items))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

fn fixed<const N: usize>(tag: u8, payload: &[u8]) -> Result<[u8; N], DecodeError> {
    payload.try_into().map_err(|_| DecodeError::BadLength {
        tag,
        expected: N,
        actual: payload.len(),
    })
}

impl Object {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
            Self::Complex { .. } => "complex",
            Self::Tuple(_) => "tuple",
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_finite() && v.fract() == 0.0 {
        write!(f, "{v:.1}")
    } else {
        write!(f, "{v}")
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write_float(f, *v),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Complex { re, im } => {
                let sign = if im.is_sign_negative() { '-' } else { '+' };
                write!(f, "({re}{sign}{}j)", im.abs())
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Object>> for Object {
    fn from(items: Vec<Object>) -> Self {
        Self::Tuple(items)
    }
}

/// JSON form used on the command line: numbers, booleans and strings map to
/// themselves, arrays to tuples and `{"re": .., "im": ..}` to a complex.
impl TryFrom<&serde_json::Value> for Object {
    type Error = EncodeError;

    fn try_from(value: &serde_json::Value) -> Result<Self, EncodeError> {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(v), _) => Ok(Self::Int(v)),
                (None, Some(v)) if n.is_f64() => Ok(Self::Float(v)),
                _ => Err(EncodeError::Unsupported(format!("integer {n} out of range"))),
            },
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Tuple),
            Value::Object(map) if map.len() == 2 => {
                match (
                    map.get("re").and_then(Value::as_f64),
                    map.get("im").and_then(Value::as_f64),
                ) {
                    (Some(re), Some(im)) => Ok(Self::Complex { re, im }),
                    _ => Err(EncodeError::Unsupported(value.to_string())),
                }
            }
            other => Err(EncodeError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tuple() -> Object {
        Object::Tuple(vec![1.into(), 2.into(), 3.into(), "string".into()])
    }

    #[test]
    fn test_round_trip_supported_kinds() {
        let values = [
            Object::Int(123),
            Object::Int(i64::MIN),
            Object::Float(1.0),
            Object::Float(-0.25),
            Object::Bool(true),
            Object::Bool(false),
            Object::Str("string".into()),
            Object::Str("unicodestr \u{00e9}\u{4e2d}".into()),
            Object::Str(String::new()),
            Object::Complex { re: 1.0, im: 1.0 },
            sample_tuple(),
            Object::Tuple(vec![]),
            Object::Tuple(vec![Object::Tuple(vec![true.into()]), 2.5.into()]),
        ];
        for value in values {
            let text = encode(&value).unwrap();
            assert!(text.starts_with(PREFIX));
            assert_eq!(decode(&text).unwrap(), value, "round trip of {value}");
        }
    }

    #[test]
    fn test_encoded_layout() {
        assert_eq!(
            encode(&Object::Bool(true)).unwrap(),
            "appreg1:030100000001"
        );
        assert_eq!(
            encode(&Object::Str("x".into())).unwrap(),
            "appreg1:040100000078"
        );
    }

    #[test]
    fn test_rejects_missing_prefix_and_bad_hex() {
        assert_eq!(decode("030100000001"), Err(DecodeError::MissingPrefix));
        assert!(matches!(
            decode("appreg1:zz"),
            Err(DecodeError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert_eq!(decode("appreg1:7f00000000"), Err(DecodeError::UnknownTag(0x7f)));
        assert_eq!(decode("appreg1:0301"), Err(DecodeError::Truncated(0)));
        assert_eq!(decode("appreg1:0302000000"), Err(DecodeError::Truncated(5)));
        assert_eq!(decode("appreg1:030100000002"), Err(DecodeError::InvalidBool(2)));
        assert_eq!(
            decode("appreg1:01020000000102"),
            Err(DecodeError::BadLength {
                tag: TAG_INT,
                expected: 8,
                actual: 2
            })
        );
        assert_eq!(decode("appreg1:0401000000ff"), Err(DecodeError::InvalidUtf8));
        assert_eq!(
            decode("appreg1:030100000001ffff"),
            Err(DecodeError::TrailingBytes(2))
        );
    }

    #[test]
    fn test_rejects_truncated_tuple_element() {
        // Tuple of 3 bytes holding an incomplete element header.
        assert_eq!(
            decode("appreg1:0603000000010800"),
            Err(DecodeError::Truncated(5))
        );
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let mut value = Object::Int(0);
        for _ in 0..MAX_DEPTH {
            value = Object::Tuple(vec![value]);
        }
        let text = encode(&value).unwrap();
        assert_eq!(decode(&text).unwrap(), value);

        let deeper = Object::Tuple(vec![value]);
        assert_eq!(encode(&deeper), Err(EncodeError::TooDeep));
    }

    #[test]
    fn test_decode_rejects_nesting_written_by_hand() {
        // 65 single-element tuples around an empty tuple, built innermost first.
        let mut bytes = vec![0x06, 0, 0, 0, 0];
        for _ in 0..=MAX_DEPTH {
            let len = u32::try_from(bytes.len()).unwrap();
            let mut outer = vec![0x06];
            outer.extend_from_slice(&len.to_le_bytes());
            outer.extend(bytes);
            bytes = outer;
        }
        let text = format!("{PREFIX}{}", hex::encode(bytes));
        assert_eq!(decode(&text), Err(DecodeError::TooDeep));
    }

    #[test]
    fn test_objects_from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"[1, 2.5, true, "x", {"re": 1, "im": -2.0}, []]"#).unwrap();
        assert_eq!(
            Object::try_from(&json).unwrap(),
            Object::Tuple(vec![
                Object::Int(1),
                Object::Float(2.5),
                Object::Bool(true),
                Object::Str("x".into()),
                Object::Complex { re: 1.0, im: -2.0 },
                Object::Tuple(vec![]),
            ])
        );

        for text in ["null", r#"{"a": 1}"#, r#"{"re": 1, "x": 2}"#, "18446744073709551615"] {
            let json: serde_json::Value = serde_json::from_str(text).unwrap();
            assert!(
                matches!(Object::try_from(&json), Err(EncodeError::Unsupported(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_display_matches_literal_form() {
        assert_eq!(sample_tuple().to_string(), "(1, 2, 3, 'string')");
        assert_eq!(Object::Complex { re: 1.0, im: 1.0 }.to_string(), "(1+1j)");
        assert_eq!(Object::Complex { re: 0.5, im: -2.0 }.to_string(), "(0.5-2j)");
        assert_eq!(Object::Float(1.0).to_string(), "1.0");
        assert_eq!(Object::Bool(true).to_string(), "True");
        assert_eq!(Object::Tuple(vec![1.into()]).to_string(), "(1,)");
    }
}
