//! Value-level converters and the shared record post-processing step.
//!
//! Transformers are stateless. [`Transformers::apply`] coerces one value into a declared
//! [`DataType`]; [`Transformers::transform_record`] applies a mapping table to a raw record
//! the same way for every input format.

pub mod boolean;
pub mod date;
pub mod decimal;

use crate::config::AmbiguousGrouping;
use crate::error::TransformError;
use crate::types::{DataType, FieldMappings, Record, Value};

pub use boolean::BooleanTransformer;
pub use date::DateTransformer;
pub use decimal::DecimalTransformer;

/// Bundle of the value transformers shared by every parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformers {
    pub date: DateTransformer,
    pub decimal: DecimalTransformer,
    pub boolean: BooleanTransformer,
}

impl Transformers {
    pub fn new(grouping: AmbiguousGrouping) -> Self {
        Self {
            date: DateTransformer,
            decimal: DecimalTransformer::new(grouping),
            boolean: BooleanTransformer,
        }
    }

    /// Coerce `value` into `data_type`.
    ///
    /// Placeholder tokens (`N/A`, `00.00.0000`, ...) become [`Value::Null`]. Nested maps are
    /// never coerced.
    pub fn apply(&self, data_type: DataType, value: &Value) -> Result<Value, TransformError> {
        let unsupported = || TransformError::Unsupported {
            expected: data_type,
            found: value.kind().to_string(),
        };

        match (data_type, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, Value::Map(_)) => Err(unsupported()),

            (DataType::Date, Value::Date(d)) => Ok(Value::Date(*d)),
            (DataType::Date, Value::Utf8(s)) => {
                Ok(self.date.transform(s)?.map_or(Value::Null, Value::Date))
            }
            (DataType::Date, Value::Int64(_) | Value::Float64(_)) => {
                let serial = value.as_f64().unwrap_or_default();
                self.date.from_serial(serial).map(Value::Date)
            }

            (DataType::Decimal | DataType::Currency, Value::Int64(i)) => Ok(Value::Float64(*i as f64)),
            (DataType::Decimal | DataType::Currency, Value::Float64(f)) => Ok(Value::Float64(*f)),
            (DataType::Decimal | DataType::Currency, Value::Utf8(s)) => {
                Ok(self.decimal.transform(s)?.map_or(Value::Null, Value::Float64))
            }

            (DataType::Integer, Value::Int64(i)) => Ok(Value::Int64(*i)),
            (DataType::Integer, Value::Float64(f)) => Ok(Value::Int64(f.trunc() as i64)),
            (DataType::Integer, Value::Utf8(s)) => {
                let parsed = self.decimal.transform(s).map_err(|_| TransformError::InvalidInteger {
                    raw: s.clone(),
                })?;
                Ok(parsed.map_or(Value::Null, |f| Value::Int64(f.trunc() as i64)))
            }

            (DataType::Boolean, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (DataType::Boolean, Value::Int64(i)) => Ok(Value::Bool(*i != 0)),
            (DataType::Boolean, Value::Float64(f)) => Ok(Value::Bool(*f != 0.0)),
            (DataType::Boolean, Value::Utf8(s)) => {
                Ok(self.boolean.transform(s).map_or(Value::Null, Value::Bool))
            }

            (DataType::String, Value::Utf8(s)) => Ok(Value::Utf8(s.trim().to_string())),
            (DataType::String, other) => Ok(Value::Utf8(other.to_string())),

            _ => Err(unsupported()),
        }
    }

    /// Apply `mappings` to one raw record.
    ///
    /// Empty values are dropped. Unmapped headers, mappings under `floor` and nested maps keep
    /// the value under the original header only. Applied mappings store the coerced value under the
    /// canonical field and under the original header when that key is still free. When coercion
    /// fails the raw value is stored under both keys and the failure is recorded on the row.
    pub fn transform_record(&self, raw: &Record, mappings: &FieldMappings, floor: f64) -> Record {
        let mut out = Record::with_capacity(raw.len() * 2);

        for (header, value) in raw.iter() {
            if value.is_empty() {
                continue;
            }
            if matches!(value, Value::Map(_)) {
                out.insert(header, value.clone());
                continue;
            }

            let Some(mapping) = mappings.get(header) else {
                out.insert(header, value.clone());
                continue;
            };
            let Some(field) = mapping.applied_field(floor) else {
                out.insert(header, value.clone());
                continue;
            };

            match self.apply(mapping.data_type, value) {
                Ok(coerced) => {
                    out.insert(field, coerced.clone());
                    out.insert_if_absent(header, coerced);
                }
                Err(err) => {
                    out.insert(field, value.clone());
                    out.insert_if_absent(header, value.clone());
                    out.push_error(format!("{header}: {err}"));
                }
            }
        }

        out
    }
}
