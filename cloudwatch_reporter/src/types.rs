use std::{fmt::Display, sync::Arc};

/// The value part of a dimension's key/value pair.
#[derive(Debug, Eq, Hash, PartialEq, Clone)]
pub enum Dimension {
    /// A static string dimension. Feel really good about these.
    Str(&'static str),
    /// Avoid String dimensions when you can, as clones can add up.
    String(String),
    /// If you have a rarely-changing identifier you could consider using shared memory
    /// instead of cloning repeatedly. The instance id dimension uses this.
    Shared(Arc<String>),
    /// A number dimension.
    Number(u64),
    /// A boolean dimension.
    Boolean(bool),
}

impl Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Str(s) => write!(f, "{s}"),
            Dimension::String(s) => write!(f, "{s}"),
            Dimension::Shared(s) => write!(f, "{s}"),
            Dimension::Number(n) => write!(f, "{n}"),
            Dimension::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// An identifier for various things.
#[derive(Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Clone)]
pub enum Name {
    /// A static string Name.
    Str(&'static str),
    /// A String name. Avoid these when you can, because clones can add up.
    String(String),
    /// If you have a rarely-changing identifier you could consider using shared memory
    /// instead of cloning repeatedly.
    Shared(Arc<String>),
}

impl Name {
    /// an &str view of the name
    pub fn as_str(&self) -> &str {
        match self {
            Name::Str(s) => s,
            Name::String(s) => s,
            Name::Shared(s) => s,
        }
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        match name {
            Name::Str(s) => s.to_owned(),
            Name::String(s) => s,
            Name::Shared(s) => {
                std::sync::Arc::<String>::try_unwrap(s).unwrap_or_else(|this| this.to_string())
            }
        }
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key/value tag attached to a datum.
pub type DimensionPair = (Name, Dimension);

/// Whatever a gauge reported at snapshot time.
///
/// Only the numeric variants can be sent. Anything else is skipped, with one
/// warning per gauge name for the lifetime of the reporter.
#[derive(Debug, Clone, PartialEq)]
pub enum GaugeValue {
    /// an integer value
    I64(i64),
    /// an integer value
    I32(i32),
    /// an unsigned integer value
    U64(u64),
    /// an unsigned integer value
    U32(u32),
    /// a floating point value
    F64(f64),
    /// a floating point value
    F32(f32),
    /// a boolean; not a number as far as the ingestion api is concerned
    Boolean(bool),
    /// text; not a number as far as the ingestion api is concerned
    Text(String),
}

impl GaugeValue {
    /// The sendable value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GaugeValue::I64(n) => Some(*n as f64),
            GaugeValue::I32(n) => Some(*n as f64),
            GaugeValue::U64(n) => Some(*n as f64),
            GaugeValue::U32(n) => Some(*n as f64),
            GaugeValue::F64(n) => Some(*n),
            GaugeValue::F32(n) => Some(*n as f64),
            GaugeValue::Boolean(_) | GaugeValue::Text(_) => None,
        }
    }

    /// A short name for the kind of value, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            GaugeValue::I64(_) => "i64",
            GaugeValue::I32(_) => "i32",
            GaugeValue::U64(_) => "u64",
            GaugeValue::U32(_) => "u32",
            GaugeValue::F64(_) => "f64",
            GaugeValue::F32(_) => "f32",
            GaugeValue::Boolean(_) => "bool",
            GaugeValue::Text(_) => "text",
        }
    }
}

impl From<&'static str> for Name {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Str(s)
    }
}

impl From<String> for Name {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Arc<String>> for Name {
    #[inline]
    fn from(s: Arc<String>) -> Self {
        Self::Shared(s)
    }
}

impl From<&'static str> for Dimension {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Str(s)
    }
}

impl From<String> for Dimension {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Arc<String>> for Dimension {
    #[inline]
    fn from(s: Arc<String>) -> Self {
        Self::Shared(s)
    }
}

impl From<u64> for Dimension {
    #[inline]
    fn from(n: u64) -> Self {
        Dimension::Number(n)
    }
}

impl From<u32> for Dimension {
    #[inline]
    fn from(n: u32) -> Self {
        Dimension::Number(n as u64)
    }
}

impl From<bool> for Dimension {
    #[inline]
    fn from(b: bool) -> Self {
        Dimension::Boolean(b)
    }
}

impl From<i64> for GaugeValue {
    #[inline]
    fn from(n: i64) -> Self {
        GaugeValue::I64(n)
    }
}

impl From<i32> for GaugeValue {
    #[inline]
    fn from(n: i32) -> Self {
        GaugeValue::I32(n)
    }
}

impl From<u64> for GaugeValue {
    #[inline]
    fn from(n: u64) -> Self {
        GaugeValue::U64(n)
    }
}

impl From<u32> for GaugeValue {
    #[inline]
    fn from(n: u32) -> Self {
        GaugeValue::U32(n)
    }
}

impl From<f64> for GaugeValue {
    #[inline]
    fn from(n: f64) -> Self {
        GaugeValue::F64(n)
    }
}

impl From<f32> for GaugeValue {
    #[inline]
    fn from(n: f32) -> Self {
        GaugeValue::F32(n)
    }
}

impl From<bool> for GaugeValue {
    #[inline]
    fn from(b: bool) -> Self {
        GaugeValue::Boolean(b)
    }
}

impl From<String> for GaugeValue {
    #[inline]
    fn from(s: String) -> Self {
        GaugeValue::Text(s)
    }
}

impl From<&str> for GaugeValue {
    #[inline]
    fn from(s: &str) -> Self {
        GaugeValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::{Dimension, GaugeValue, Name};

    #[test_log::test]
    fn gauge_values_are_numbers_or_not() {
        assert_eq!(Some(3.0), GaugeValue::from(3_i64).as_f64());
        assert_eq!(Some(4.0), GaugeValue::from(4_u32).as_f64());
        assert_eq!(Some(0.5), GaugeValue::from(0.5_f32).as_f64());
        assert_eq!(None, GaugeValue::from("hello").as_f64());
        assert_eq!(None, GaugeValue::from(true).as_f64());
        assert_eq!("text", GaugeValue::from("hello").type_name());
    }

    #[test_log::test]
    fn dimensions_render_as_text() {
        assert_eq!("i-1234", Dimension::from("i-1234").to_string());
        assert_eq!("42", Dimension::from(42_u64).to_string());
        assert_eq!("false", Dimension::from(false).to_string());
        assert_eq!("InstanceId", String::from(Name::from("InstanceId")));
    }
}
