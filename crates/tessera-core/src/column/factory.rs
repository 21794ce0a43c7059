//! Building columns from a type description.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collections::{DictionaryColumn, ListColumn, NumberListColumn};
use crate::error::{Result, SchemaError};
use crate::value::{ScalarValue, Value};

use super::{
    AnyColumn, BooleanColumn, DateTimeColumn, DistinctColumn, DynColumn, Number, NumberColumn,
    RefColumn, RefListColumn, StringColumn,
};

/// The stored type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Char,
    String,
    DateTime,
    /// Reference to a row of the named table.
    Ref(String),
    /// List of references to rows of the named table.
    RefList(String),
    List(Box<FieldType>),
    Dictionary(Box<FieldType>, Box<FieldType>),
    /// Distinct-compressed column of a hashable scalar type.
    Distinct(Box<FieldType>),
}

impl FieldType {
    /// Whether values of this type can be dictionary keys.
    pub fn is_hashable(&self) -> bool {
        !matches!(
            self,
            FieldType::F32
                | FieldType::F64
                | FieldType::Ref(_)
                | FieldType::RefList(_)
                | FieldType::List(_)
                | FieldType::Dictionary(..)
                | FieldType::Distinct(_)
        )
    }
}

fn unsupported(field: &FieldType, reason: &str) -> SchemaError {
    SchemaError::UnsupportedType(format!("{field:?}: {reason}"))
}

fn scalar_default<T: ScalarValue>(default: Option<Value>, fallback: T) -> Result<T> {
    match default {
        None | Some(Value::Null) => Ok(fallback),
        Some(value) => T::try_from_value(value),
    }
}

fn number<T: Number>(default: Option<Value>) -> Result<NumberColumn<T>> {
    Ok(NumberColumn::new(scalar_default(default, T::default())?))
}

fn datetime_default(default: Option<Value>) -> Result<DateTime<Utc>> {
    scalar_default(default, DateTime::UNIX_EPOCH)
}

fn no_default(field: &FieldType, default: Option<Value>) -> Result<()> {
    match default {
        None | Some(Value::Null) => Ok(()),
        Some(_) => Err(unsupported(field, "this type has no configurable default").into()),
    }
}

/// Build an empty column of the given type.
///
/// Scalar columns accept a default value; strings always default to `""`
/// and collection and reference columns to empty or null.
pub fn build_column(field: &FieldType, default: Option<Value>) -> Result<Box<dyn AnyColumn>> {
    Ok(match field {
        FieldType::Bool => Box::new(BooleanColumn::new(scalar_default(default, false)?)),
        FieldType::U8 => Box::new(number::<u8>(default)?),
        FieldType::I8 => Box::new(number::<i8>(default)?),
        FieldType::U16 => Box::new(number::<u16>(default)?),
        FieldType::I16 => Box::new(number::<i16>(default)?),
        FieldType::U32 => Box::new(number::<u32>(default)?),
        FieldType::I32 => Box::new(number::<i32>(default)?),
        FieldType::U64 => Box::new(number::<u64>(default)?),
        FieldType::I64 => Box::new(number::<i64>(default)?),
        FieldType::F32 => Box::new(number::<f32>(default)?),
        FieldType::F64 => Box::new(number::<f64>(default)?),
        FieldType::Char => Box::new(number::<char>(default)?),
        FieldType::String => {
            if !scalar_default(default, String::new())?.is_empty() {
                return Err(unsupported(field, "string columns always default to \"\"").into());
            }
            Box::new(StringColumn::new())
        }
        FieldType::DateTime => Box::new(DateTimeColumn::new(datetime_default(default)?)),
        FieldType::Ref(target) => {
            no_default(field, default)?;
            Box::new(RefColumn::new(target.as_str()))
        }
        FieldType::RefList(target) => {
            no_default(field, default)?;
            Box::new(RefListColumn::new(target.as_str()))
        }
        FieldType::List(inner) => {
            no_default(field, default)?;
            build_list(field, inner)?
        }
        FieldType::Dictionary(key, value) => {
            no_default(field, default)?;
            if !key.is_hashable() {
                return Err(unsupported(field, "dictionary keys must be hashable scalars").into());
            }
            Box::new(DictionaryColumn::new(
                DynColumn::new(build_column(key, None)?),
                DynColumn::new(build_column(value, None)?),
            ))
        }
        FieldType::Distinct(inner) => build_distinct(field, inner, default)?,
    })
}

fn build_list(field: &FieldType, inner: &FieldType) -> Result<Box<dyn AnyColumn>> {
    Ok(match inner {
        FieldType::U8 => Box::new(NumberListColumn::<u8>::new()),
        FieldType::I8 => Box::new(NumberListColumn::<i8>::new()),
        FieldType::U16 => Box::new(NumberListColumn::<u16>::new()),
        FieldType::I16 => Box::new(NumberListColumn::<i16>::new()),
        FieldType::U32 => Box::new(NumberListColumn::<u32>::new()),
        FieldType::I32 => Box::new(NumberListColumn::<i32>::new()),
        FieldType::U64 => Box::new(NumberListColumn::<u64>::new()),
        FieldType::I64 => Box::new(NumberListColumn::<i64>::new()),
        FieldType::F32 => Box::new(NumberListColumn::<f32>::new()),
        FieldType::F64 => Box::new(NumberListColumn::<f64>::new()),
        FieldType::Char => Box::new(NumberListColumn::<char>::new()),
        FieldType::Ref(_) => {
            return Err(unsupported(field, "use RefList for lists of references").into());
        }
        other => Box::new(ListColumn::new(DynColumn::new(build_column(other, None)?))),
    })
}

fn build_distinct(
    field: &FieldType,
    inner: &FieldType,
    default: Option<Value>,
) -> Result<Box<dyn AnyColumn>> {
    Ok(match inner {
        FieldType::Bool => Box::new(DistinctColumn::new(BooleanColumn::new(scalar_default(
            default, false,
        )?))),
        FieldType::U8 => Box::new(DistinctColumn::new(number::<u8>(default)?)),
        FieldType::I8 => Box::new(DistinctColumn::new(number::<i8>(default)?)),
        FieldType::U16 => Box::new(DistinctColumn::new(number::<u16>(default)?)),
        FieldType::I16 => Box::new(DistinctColumn::new(number::<i16>(default)?)),
        FieldType::U32 => Box::new(DistinctColumn::new(number::<u32>(default)?)),
        FieldType::I32 => Box::new(DistinctColumn::new(number::<i32>(default)?)),
        FieldType::U64 => Box::new(DistinctColumn::new(number::<u64>(default)?)),
        FieldType::I64 => Box::new(DistinctColumn::new(number::<i64>(default)?)),
        FieldType::Char => Box::new(DistinctColumn::new(number::<char>(default)?)),
        FieldType::String => {
            if !scalar_default(default, String::new())?.is_empty() {
                return Err(unsupported(field, "string columns always default to \"\"").into());
            }
            Box::new(DistinctColumn::new(StringColumn::new()))
        }
        FieldType::DateTime => Box::new(DistinctColumn::new(DateTimeColumn::new(
            datetime_default(default)?,
        ))),
        _ => return Err(unsupported(field, "only hashable scalars can be distinct").into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::io::{TreeFormat, from_bytes, to_bytes};

    #[test]
    fn test_scalar_defaults() {
        let column = build_column(&FieldType::I16, Some(Value::I64(-5))).unwrap();
        assert_eq!(column.get_value(10), Value::I16(-5));

        let column = build_column(&FieldType::Bool, Some(Value::Bool(true))).unwrap();
        assert_eq!(column.default_value(), Value::Bool(true));

        let column = build_column(&FieldType::DateTime, None).unwrap();
        assert_eq!(column.get_value(0), Value::DateTime(DateTime::UNIX_EPOCH));
    }

    #[test]
    fn test_rejected_types_and_defaults() {
        let cases = [
            (FieldType::U8, Some(Value::I32(300))),
            (FieldType::String, Some(Value::String("x".into()))),
            (FieldType::Ref("Person".into()), Some(Value::I32(0))),
            (FieldType::List(Box::new(FieldType::Ref("Person".into()))), None),
            (
                FieldType::Dictionary(Box::new(FieldType::F64), Box::new(FieldType::I32)),
                None,
            ),
            (FieldType::Distinct(Box::new(FieldType::F32)), None),
            (
                FieldType::Distinct(Box::new(FieldType::List(Box::new(FieldType::U8)))),
                None,
            ),
        ];
        for (field, default) in cases {
            assert!(build_column(&field, default).is_err(), "{field:?}");
        }
        assert!(matches!(
            build_column(&FieldType::Char, Some(Value::Bool(true))),
            Err(Error::Schema(SchemaError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_list_of_numbers_uses_number_lists() {
        let column = build_column(&FieldType::List(Box::new(FieldType::U16)), None).unwrap();
        assert!(column.as_any().downcast_ref::<NumberListColumn<u16>>().is_some());

        let column = build_column(&FieldType::List(Box::new(FieldType::String)), None).unwrap();
        assert!(column.as_any().downcast_ref::<ListColumn<DynColumn>>().is_some());
    }

    #[test]
    fn test_nested_dynamic_columns() {
        let field = FieldType::Dictionary(
            Box::new(FieldType::String),
            Box::new(FieldType::List(Box::new(FieldType::Bool))),
        );
        let mut column = build_column(&field, None).unwrap();
        let entry = Value::Map(vec![(
            Value::String("flags".into()),
            Value::List(vec![Value::Bool(true), Value::Bool(false)]),
        )]);
        column.set_value(1, entry.clone()).unwrap();
        assert_eq!(column.get_value(1), entry);
        assert_eq!(column.get_value(0), Value::Map(Vec::new()));

        let bytes = to_bytes(&*column, TreeFormat::Binary).unwrap();
        let mut read = build_column(&field, None).unwrap();
        from_bytes(&mut *read, TreeFormat::Binary, &bytes, &Default::default()).unwrap();
        assert_eq!(read.get_value(1), entry);
    }

    #[test]
    fn test_distinct_columns() {
        let mut column = build_column(&FieldType::Distinct(Box::new(FieldType::String)), None).unwrap();
        column.set_value(3, Value::String("blue".into())).unwrap();
        assert_eq!(column.get_value(3), Value::String("blue".into()));
        assert!(
            column
                .as_any()
                .downcast_ref::<DistinctColumn<StringColumn>>()
                .is_some_and(|c| c.is_mapping_values())
        );
    }

    #[test]
    fn test_field_type_serde() {
        let field = FieldType::Dictionary(Box::new(FieldType::String), Box::new(FieldType::Ref("Person".into())));
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, r#"{"Dictionary":["String",{"Ref":"Person"}]}"#);
        let back: FieldType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }
}
