use serde::{
    de::{
        self,
        value::{Error, SeqDeserializer},
        Error as _, IntoDeserializer, Unexpected,
    },
    forward_to_deserialize_any, Deserializer,
};

use crate::schema::record::{Row, Value};

impl<'de> IntoDeserializer<'de> for Row {
    type Deserializer = SeqDeserializer<std::vec::IntoIter<Value>, Error>;

    fn into_deserializer(self) -> Self::Deserializer {
        SeqDeserializer::new(self.values.into_iter())
    }
}

impl<'de> IntoDeserializer<'de> for Value {
    type Deserializer = Value;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl Value {
    fn is_absent(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Reserved(_) | Value::Overflow(_) | Value::Truncated(_)
        )
    }
}

impl<'de> Deserializer<'de> for Value {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match self {
            Value::Integer(value) | Value::IntegerConstant(value) => visitor.visit_i64(value),
            Value::Float(value) => visitor.visit_f64(value),
            Value::Blob(value) => visitor.visit_byte_buf(value),
            Value::Text(value) => visitor.visit_string(value),
            Value::Null | Value::Reserved(_) | Value::Overflow(_) | Value::Truncated(_) => {
                visitor.visit_none()
            }
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.is_absent() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match self {
            Value::Blob(bytes) => SeqDeserializer::<_, Error>::new(bytes.into_iter())
                .deserialize_any(visitor),
            value => value.deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match self {
            Value::Text(text) => visitor.visit_enum(text.into_deserializer()),
            Value::Integer(value) | Value::IntegerConstant(value) => Err(Error::invalid_type(
                Unexpected::Signed(value),
                &"a text value",
            )),
            _ => Err(Error::custom("expected a text value")),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct newtype_struct tuple
        tuple_struct map struct identifier ignored_any
    }
}
