//! Pre-flight walk over a value before it becomes JSON
//!
//! `serde_json` quietly turns NaN and infinities into `null`, and it cannot
//! tell `()` apart from `None` once both are `null`. Walking the value through
//! its own `Serialize` impl first catches both.

use serde::ser::{self, Serialize};
use std::fmt;

/// What the outermost value serialized as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopLevel {
    /// `()` or a unit struct
    Unit,
    Other,
}

/// Walk `value`, failing on the first float with no JSON form
pub(crate) fn scan<T: Serialize + ?Sized>(value: &T) -> Result<TopLevel, NonFinite> {
    value.serialize(Scanner)
}

#[derive(Debug)]
pub(crate) struct NonFinite(String);

impl fmt::Display for NonFinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFinite {}

impl ser::Error for NonFinite {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

fn check_float(value: f64) -> Result<TopLevel, NonFinite> {
    if value.is_finite() {
        Ok(TopLevel::Other)
    } else {
        Err(NonFinite(format!("{value} has no JSON representation")))
    }
}

struct Scanner;

type Walk = Result<TopLevel, NonFinite>;

impl ser::Serializer for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    type SerializeSeq = Scanner;
    type SerializeTuple = Scanner;
    type SerializeTupleStruct = Scanner;
    type SerializeTupleVariant = Scanner;
    type SerializeMap = Scanner;
    type SerializeStruct = Scanner;
    type SerializeStructVariant = Scanner;

    fn serialize_bool(self, _: bool) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_i8(self, _: i8) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_i16(self, _: i16) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_i32(self, _: i32) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_i64(self, _: i64) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_i128(self, _: i128) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_u8(self, _: u8) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_u16(self, _: u16) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_u32(self, _: u32) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_u64(self, _: u64) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_u128(self, _: u128) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_f32(self, v: f32) -> Walk {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Walk {
        check_float(v)
    }
    fn serialize_char(self, _: char) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_str(self, _: &str) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_bytes(self, _: &[u8]) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_none(self) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Walk {
        value.serialize(Scanner).map(|_| TopLevel::Other)
    }
    fn serialize_unit(self) -> Walk {
        Ok(TopLevel::Unit)
    }
    fn serialize_unit_struct(self, _: &'static str) -> Walk {
        Ok(TopLevel::Unit)
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Walk {
        Ok(TopLevel::Other)
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _: &'static str, value: &T) -> Walk {
        value.serialize(Scanner).map(|_| TopLevel::Other)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Walk {
        value.serialize(Scanner).map(|_| TopLevel::Other)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_tuple(self, _: usize) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Scanner, NonFinite> {
        Ok(Scanner)
    }
}

fn element<T: Serialize + ?Sized>(value: &T) -> Result<(), NonFinite> {
    value.serialize(Scanner).map(|_| ())
}

impl ser::SerializeSeq for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeTuple for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeTupleStruct for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeTupleVariant for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeMap for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), NonFinite> {
        element(key)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeStruct for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

impl ser::SerializeStructVariant for Scanner {
    type Ok = TopLevel;
    type Error = NonFinite;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), NonFinite> {
        element(value)
    }
    fn end(self) -> Walk {
        Ok(TopLevel::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unit_is_told_apart_from_none() {
        assert_eq!(scan(&()).unwrap(), TopLevel::Unit);
        assert_eq!(scan(&None::<u8>).unwrap(), TopLevel::Other);
        assert_eq!(scan(&(None::<u8>,)).unwrap(), TopLevel::Other);
        assert_eq!(scan(&Some(())).unwrap(), TopLevel::Other);
    }

    #[test]
    fn test_nested_non_finite_floats_found() {
        assert!(scan(&f64::NAN).is_err());
        assert!(scan(&(1u8, vec![0.5, f64::INFINITY])).is_err());
        assert!(scan(&Some(f32::NEG_INFINITY)).is_err());

        let mut map = BTreeMap::new();
        map.insert("ratio", f64::NAN);
        assert!(scan(&map).is_err());

        assert!(scan(&(1.5f64, f64::MAX, "text")).is_ok());
    }
}
