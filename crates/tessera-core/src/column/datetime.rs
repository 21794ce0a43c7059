use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::{ScalarValue, Value};

use super::Column;
use super::number::NumberColumn;

/// UTC timestamps stored as microseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeColumn {
    micros: NumberColumn<i64>,
    default: DateTime<Utc>,
}

impl DateTimeColumn {
    pub fn new(default: DateTime<Utc>) -> Self {
        Self {
            micros: NumberColumn::new(default.timestamp_micros()),
            default,
        }
    }
}

impl Default for DateTimeColumn {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl Column for DateTimeColumn {
    type Item = DateTime<Utc>;

    fn len(&self) -> usize {
        self.micros.len()
    }

    fn get(&self, index: usize) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.get(index)).unwrap_or(self.default)
    }

    fn set(&mut self, index: usize, value: DateTime<Utc>) {
        self.micros.set(index, value.timestamp_micros());
    }

    fn clear(&mut self) {
        self.micros.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.micros.remove_from_end(count);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.micros.swap(a, b);
    }

    fn trim(&mut self) {
        self.micros.trim();
    }

    fn default_item(&self) -> DateTime<Utc> {
        self.default
    }

    fn item_to_value(&self, item: DateTime<Utc>) -> Value {
        Value::DateTime(item)
    }

    fn item_from_value(&self, value: Value) -> Result<DateTime<Utc>> {
        match value {
            Value::Null => Ok(self.default),
            other => DateTime::<Utc>::try_from_value(other),
        }
    }
}

impl TreeSerializable for DateTimeColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.micros.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.micros.read_tree(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{TreeFormat, from_bytes, to_bytes};

    #[test]
    fn test_microsecond_precision_round_trip() {
        let when = DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        let mut column = DateTimeColumn::default();
        column.set(1, when);
        assert_eq!(column.get(0), DateTime::UNIX_EPOCH);

        let bytes = to_bytes(&column, TreeFormat::Binary).unwrap();
        let mut read = DateTimeColumn::default();
        from_bytes(&mut read, TreeFormat::Binary, &bytes, &Default::default()).unwrap();
        assert_eq!(read.get(1), when);
        assert_eq!(read.len(), 2);
    }
}
