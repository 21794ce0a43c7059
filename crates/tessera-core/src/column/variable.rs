//! Variable-length columns: one sequence of elements per row, stored in
//! chapters of [`CHAPTER_ROW_COUNT`] rows.

use tracing::debug;

use crate::error::{FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::types::{CHAPTER_ROW_COUNT, CHAPTER_ROW_SHIFT};
use crate::value::Value;

use super::Column;
use super::chapter::Chapter;
use super::number::Number;

const COUNT: &str = "Count";
const CHAPTERS: &str = "Chapters";

fn split(index: usize) -> (usize, usize) {
    (index >> CHAPTER_ROW_SHIFT, index & (CHAPTER_ROW_COUNT - 1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableLengthColumn<E: Number> {
    chapters: Vec<Chapter<E>>,
    count: usize,
}

impl<E: Number> Default for VariableLengthColumn<E> {
    fn default() -> Self {
        Self {
            chapters: Vec::new(),
            count: 0,
        }
    }
}

impl<E: Number> VariableLengthColumn<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the elements of row `index`. Rows never written are empty.
    pub fn slice(&self, index: usize) -> &[E] {
        let (chapter, row) = split(index);
        match self.chapters.get(chapter) {
            Some(chapter) => chapter.get(row),
            None => &[],
        }
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn requires_trim(&self) -> bool {
        self.chapters.iter().any(Chapter::requires_trim)
    }
}

impl<E: Number> Column for VariableLengthColumn<E> {
    type Item = Vec<E>;

    fn len(&self) -> usize {
        self.count
    }

    fn get(&self, index: usize) -> Vec<E> {
        self.slice(index).to_vec()
    }

    fn set(&mut self, index: usize, value: Vec<E>) {
        let (chapter, row) = split(index);
        if chapter >= self.chapters.len() {
            self.chapters.resize_with(chapter + 1, Chapter::new);
        }
        self.chapters[chapter].set(row, value);
        if index >= self.count {
            self.count = index + 1;
        }
    }

    fn clear(&mut self) {
        self.chapters.clear();
        self.count = 0;
    }

    fn remove_from_end(&mut self, count: usize) {
        let len = self.count.saturating_sub(count);
        if len == 0 {
            self.clear();
            return;
        }
        let (last, row) = split(len - 1);
        self.chapters.truncate(last + 1);
        if let Some(chapter) = self.chapters.get_mut(last) {
            chapter.truncate(row + 1);
        }
        self.count = len;
    }

    fn trim(&mut self) {
        for chapter in &mut self.chapters {
            chapter.trim();
        }
    }

    fn default_item(&self) -> Vec<E> {
        Vec::new()
    }

    fn item_to_value(&self, item: Vec<E>) -> Value {
        Value::List(item.into_iter().map(E::into_value).collect())
    }

    fn item_from_value(&self, value: Value) -> Result<Vec<E>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(E::try_from_value).collect(),
            other => Err(other.mismatch("list").into()),
        }
    }
}

impl<E: Number> TreeSerializable for VariableLengthColumn<E> {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_i64_property(COUNT, self.count as i64)?;
        if !self.chapters.is_empty() {
            writer.property_name(CHAPTERS)?;
            writer.start_array()?;
            for chapter in &self.chapters {
                chapter.write_tree(writer)?;
            }
            writer.end_array()?;
        }
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        let mut count = 0;
        reader.read_object(|r, name| {
            match name {
                COUNT => count = r.read_usize()?,
                CHAPTERS => r.read_array(|r| {
                    let mut chapter = Chapter::new();
                    chapter.read_tree(r)?;
                    self.chapters.push(chapter);
                    Ok(())
                })?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        if self.chapters.len() > count.div_ceil(CHAPTER_ROW_COUNT) {
            return Err(FormatError::Corrupt(format!(
                "{} chapters for {count} rows",
                self.chapters.len()
            ))
            .into());
        }
        if let Some(last) = self.chapters.last() {
            let (index, _) = split(count.saturating_sub(1));
            if index + 1 == self.chapters.len() && last.len() > count - index * CHAPTER_ROW_COUNT {
                return Err(FormatError::Corrupt(format!(
                    "last chapter holds {} rows, column has {count}",
                    last.len()
                ))
                .into());
            }
        }
        debug!(rows = count, chapters = self.chapters.len(), "read variable-length column");
        self.count = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{TreeFormat, from_bytes, to_bytes};

    #[test]
    fn test_rows_span_chapters() {
        let mut column = VariableLengthColumn::<u16>::new();
        column.set(3, vec![1, 2, 3]);
        column.set(CHAPTER_ROW_COUNT + 5, vec![9; 4000]);
        assert_eq!(column.len(), CHAPTER_ROW_COUNT + 6);
        assert_eq!(column.chapter_count(), 2);
        assert_eq!(column.slice(3), &[1, 2, 3]);
        assert_eq!(column.slice(CHAPTER_ROW_COUNT + 5).len(), 4000);
        assert!(column.slice(CHAPTER_ROW_COUNT).is_empty());
        assert!(column.slice(10 * CHAPTER_ROW_COUNT).is_empty());
    }

    #[test]
    fn test_remove_from_end_drops_chapters() {
        let mut column = VariableLengthColumn::<u8>::new();
        column.set(0, b"a".to_vec());
        column.set(CHAPTER_ROW_COUNT + 1, b"b".to_vec());
        column.remove_from_end(2);
        assert_eq!(column.len(), CHAPTER_ROW_COUNT);
        assert_eq!(column.chapter_count(), 1);
        assert_eq!(column.slice(0), b"a");
        assert!(column.slice(CHAPTER_ROW_COUNT + 1).is_empty());
    }

    #[test]
    fn test_round_trip_untrimmed_and_trimmed() {
        let mut column = VariableLengthColumn::<i32>::new();
        for i in 0..50 {
            column.set(i, (0..i as i32).collect());
        }
        for format in [TreeFormat::Binary, TreeFormat::Json] {
            let before = to_bytes(&column, format).unwrap();
            let mut trimmed = column.clone();
            trimmed.trim();
            assert_eq!(to_bytes(&trimmed, format).unwrap(), before);

            let mut read = VariableLengthColumn::<i32>::new();
            from_bytes(&mut read, format, &before, &Default::default()).unwrap();
            assert_eq!(read.len(), 50);
            for i in 0..50 {
                assert_eq!(read.slice(i), column.slice(i));
            }
        }
    }

    #[test]
    fn test_value_conversion() {
        let mut column = VariableLengthColumn::<u8>::new();
        let item = column
            .item_from_value(Value::List(vec![Value::U8(1), Value::I64(2)]))
            .unwrap();
        column.set(0, item);
        assert_eq!(
            column.item_to_value(column.get(0)),
            Value::List(vec![Value::U8(1), Value::U8(2)])
        );
        assert!(column.item_from_value(Value::Bool(true)).is_err());
    }
}
