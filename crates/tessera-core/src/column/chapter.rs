//! One chapter of a variable-length column.
//!
//! A chapter holds up to [`CHAPTER_ROW_COUNT`] values. Values of at most
//! [`MAX_SMALL_VALUE_LEN`] elements are packed back to back in
//! `small_values`; longer values live in `large_values`, keyed by row.
//!
//! Rows are grouped into pages of [`PAGE_ROW_COUNT`]. `page_start[p]` is the
//! offset of page `p` within `small_values`, and `value_end[i]` is the end of
//! row `i` relative to its page. A row starts where the previous row ends,
//! or at its page start for the first row of a page.
//!
//! Every write goes to `large_values`. A small write marks the chapter as
//! needing a trim, which re-packs all small values in one pass.

use std::borrow::Cow;
use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{FormatError, Result};
use crate::io::{BlockElement, TreeReader, TreeSerializable, TreeWriter};
use crate::types::{CHAPTER_ROW_COUNT, MAX_SMALL_VALUE_LEN, PAGE_ROW_COUNT, PAGE_ROW_SHIFT};

const COUNT: &str = "Count";
const PAGE_START: &str = "PageStart";
const VALUE_END: &str = "ValueEnd";
const SMALL_VALUES: &str = "SmallValues";
const LARGE_VALUES: &str = "LargeValues";

struct Packed<'a, E: Clone> {
    page_start: Cow<'a, [u32]>,
    value_end: Cow<'a, [u16]>,
    small_values: Cow<'a, [E]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter<E: BlockElement> {
    page_start: Vec<u32>,
    value_end: Vec<u16>,
    small_values: Vec<E>,
    large_values: BTreeMap<usize, Vec<E>>,
    requires_trim: bool,
    count: usize,
}

impl<E: BlockElement> Default for Chapter<E> {
    fn default() -> Self {
        Self {
            page_start: vec![0],
            value_end: Vec::new(),
            small_values: Vec::new(),
            large_values: BTreeMap::new(),
            requires_trim: false,
            count: 0,
        }
    }
}

impl<E: BlockElement> Chapter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in this chapter, including trailing empty rows.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether small values are waiting in the overflow map to be re-packed.
    pub fn requires_trim(&self) -> bool {
        self.requires_trim
    }

    /// Whether row `index` is currently served from the packed area.
    pub fn is_packed(&self, index: usize) -> bool {
        index < self.value_end.len() && !self.large_values.contains_key(&index)
    }

    /// Number of values held in the overflow map.
    pub fn large_value_count(&self) -> usize {
        self.large_values.len()
    }

    fn packed_range(&self, index: usize) -> (usize, usize) {
        let page = self.page_start[index >> PAGE_ROW_SHIFT] as usize;
        let end = page + self.value_end[index] as usize;
        let start = if index % PAGE_ROW_COUNT == 0 {
            page
        } else {
            page + self.value_end[index - 1] as usize
        };
        (start, end)
    }

    pub fn get(&self, index: usize) -> &[E] {
        if let Some(value) = self.large_values.get(&index) {
            return value;
        }
        if index < self.value_end.len() {
            let (start, end) = self.packed_range(index);
            return &self.small_values[start..end];
        }
        &[]
    }

    pub fn set(&mut self, index: usize, value: Vec<E>) {
        debug_assert!(index < CHAPTER_ROW_COUNT);
        if index >= self.count {
            self.count = index + 1;
        }
        if value.is_empty() && index >= self.value_end.len() {
            self.large_values.remove(&index);
            return;
        }
        self.requires_trim |= value.len() <= MAX_SMALL_VALUE_LEN;
        self.large_values.insert(index, value);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Keep only the first `len` rows.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.count {
            return;
        }
        self.large_values.split_off(&len);
        if len < self.value_end.len() {
            let end = if len == 0 { 0 } else { self.packed_range(len - 1).1 };
            self.value_end.truncate(len);
            self.small_values.truncate(end);
            self.page_start.truncate((len >> PAGE_ROW_SHIFT) + 1);
        }
        self.count = len;
        self.requires_trim = self
            .large_values
            .values()
            .any(|v| v.len() <= MAX_SMALL_VALUE_LEN);
    }

    /// The packed layout, recomputed only when small values are pending.
    fn packed(&self) -> Packed<'_, E> {
        if !self.requires_trim {
            return Packed {
                page_start: Cow::Borrowed(&self.page_start),
                value_end: Cow::Borrowed(&self.value_end),
                small_values: Cow::Borrowed(&self.small_values),
            };
        }

        let small_len: usize = (0..self.count)
            .map(|i| self.get(i).len())
            .filter(|len| *len <= MAX_SMALL_VALUE_LEN)
            .sum();

        let mut small_values = Vec::with_capacity(small_len);
        let mut page_start = Vec::with_capacity((self.count >> PAGE_ROW_SHIFT) + 1);
        let mut value_end = Vec::with_capacity(self.count);
        let mut page_base = 0;

        for i in 0..self.count {
            if i % PAGE_ROW_COUNT == 0 {
                page_base = small_values.len();
                page_start.push(page_base as u32);
            }
            let value = self.get(i);
            if value.len() <= MAX_SMALL_VALUE_LEN {
                small_values.extend_from_slice(value);
            }
            value_end.push((small_values.len() - page_base) as u16);
        }
        page_start.resize((self.count >> PAGE_ROW_SHIFT) + 1, small_values.len() as u32);

        Packed {
            page_start: Cow::Owned(page_start),
            value_end: Cow::Owned(value_end),
            small_values: Cow::Owned(small_values),
        }
    }

    /// Re-pack every small value and drop it from the overflow map.
    pub fn trim(&mut self) {
        if !self.requires_trim {
            return;
        }
        let packed = self.packed();
        let page_start = packed.page_start.into_owned();
        let value_end = packed.value_end.into_owned();
        let small_values = packed.small_values.into_owned();
        trace!(
            rows = self.count,
            packed = small_values.len(),
            "re-packed chapter"
        );

        self.page_start = page_start;
        self.value_end = value_end;
        self.small_values = small_values;
        self.large_values.retain(|_, v| v.len() > MAX_SMALL_VALUE_LEN);
        self.requires_trim = false;
    }

    fn validate(&self) -> Result<()> {
        let pages = self.value_end.len().div_ceil(PAGE_ROW_COUNT);
        if self.page_start.len() < pages.max(1) {
            return Err(corrupt(format!(
                "{} rows need {} page starts, found {}",
                self.value_end.len(),
                pages,
                self.page_start.len()
            )));
        }
        for i in 0..self.value_end.len() {
            let (start, end) = self.packed_range(i);
            if start > end || end > self.small_values.len() {
                return Err(corrupt(format!(
                    "row {i} spans {start}..{end} of {} packed elements",
                    self.small_values.len()
                )));
            }
        }
        if let Some((&last, _)) = self.large_values.last_key_value() {
            if last >= CHAPTER_ROW_COUNT {
                return Err(corrupt(format!("large value row {last} exceeds chapter size")));
            }
        }
        Ok(())
    }
}

fn corrupt(message: String) -> crate::error::Error {
    FormatError::Corrupt(message).into()
}

impl<E: BlockElement> TreeSerializable for Chapter<E> {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        let packed = self.packed();
        writer.start_object()?;

        let has_small = !packed.small_values.is_empty();
        let packed_rows = if has_small { packed.value_end.len() } else { 0 };
        if self.count > packed_rows {
            writer.write_i64_property(COUNT, self.count as i64)?;
        }
        if has_small {
            writer.write_block_property(VALUE_END, &packed.value_end[..])?;
            writer.write_block_property(SMALL_VALUES, &packed.small_values[..])?;
            if packed.page_start.len() > 1 {
                writer.write_block_property(PAGE_START, &packed.page_start[..])?;
            }
        }

        let mut large = self
            .large_values
            .iter()
            .filter(|(_, v)| v.len() > MAX_SMALL_VALUE_LEN)
            .peekable();
        if large.peek().is_some() {
            writer.property_name(LARGE_VALUES)?;
            writer.write_int_dictionary(large.map(|(k, v)| (*k as i64, v)), |w, v| {
                w.write_block(E::as_block(v))
            })?;
        }

        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        let mut count = 0usize;
        let mut value_end_read = false;

        reader.read_object(|r, name| {
            match name {
                COUNT => count = r.read_usize()?,
                PAGE_START => self.page_start = r.read_block_of()?,
                VALUE_END => {
                    self.value_end = r.read_block_of()?;
                    value_end_read = true;
                }
                SMALL_VALUES => self.small_values = r.read_block_of()?,
                LARGE_VALUES => r.read_int_dictionary(|r, key| {
                    let row = usize::try_from(key)
                        .map_err(|_| corrupt(format!("negative large value row {key}")))?;
                    let value = r.read_block_of()?;
                    self.large_values.insert(row, value);
                    Ok(())
                })?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        if value_end_read {
            count = count.max(self.value_end.len());
        }
        if let Some((&last, _)) = self.large_values.last_key_value() {
            count = count.max(last + 1);
        }
        self.count = count;
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{TreeFormat, from_bytes, to_bytes};

    fn value(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    fn round_trip(chapter: &Chapter<u8>) -> Chapter<u8> {
        let bytes = to_bytes(chapter, TreeFormat::Binary).unwrap();
        let mut read = Chapter::new();
        from_bytes(&mut read, TreeFormat::Binary, &bytes, &Default::default()).unwrap();
        read
    }

    #[test]
    fn test_small_and_large_boundary() {
        let mut chapter = Chapter::new();
        chapter.set(0, value(MAX_SMALL_VALUE_LEN, 1));
        chapter.set(1, value(MAX_SMALL_VALUE_LEN + 1, 2));
        assert!(chapter.requires_trim());
        assert!(!chapter.is_packed(0));

        chapter.trim();
        assert!(chapter.is_packed(0));
        assert!(!chapter.is_packed(1));
        assert_eq!(chapter.large_value_count(), 1);
        assert_eq!(chapter.get(0), value(MAX_SMALL_VALUE_LEN, 1).as_slice());
        assert_eq!(chapter.get(1), value(MAX_SMALL_VALUE_LEN + 1, 2).as_slice());
    }

    #[test]
    fn test_page_offsets_across_pages() {
        let mut chapter = Chapter::new();
        for i in 0..100 {
            chapter.set(i, value(i % 7, i as u8));
        }
        chapter.trim();
        assert_eq!(chapter.page_start.len(), 100 / PAGE_ROW_COUNT + 1);
        for i in 0..100 {
            assert_eq!(chapter.get(i), value(i % 7, i as u8).as_slice(), "row {i}");
        }
    }

    #[test]
    fn test_overwrite_after_trim() {
        let mut chapter = Chapter::new();
        chapter.set(0, b"one".to_vec());
        chapter.set(1, b"two".to_vec());
        chapter.trim();
        chapter.set(0, b"eleven".to_vec());
        assert_eq!(chapter.get(0), b"eleven");
        assert_eq!(chapter.get(1), b"two");
        chapter.trim();
        assert_eq!(chapter.get(0), b"eleven");
        assert_eq!(chapter.get(1), b"two");
        assert!(!chapter.requires_trim());
    }

    #[test]
    fn test_trim_is_idempotent() {
        let mut chapter = Chapter::new();
        for i in 0..40 {
            chapter.set(i, value(i, 3));
        }
        chapter.trim();
        let once = chapter.clone();
        chapter.trim();
        assert_eq!(chapter, once);
    }

    #[test]
    fn test_empty_rows_preserve_count() {
        let mut chapter = Chapter::<u8>::new();
        chapter.set(9, Vec::new());
        assert_eq!(chapter.len(), 10);
        assert_eq!(chapter.large_value_count(), 0);

        let read = round_trip(&chapter);
        assert_eq!(read.len(), 10);
        assert!(read.get(9).is_empty());
    }

    #[test]
    fn test_write_does_not_require_trim() {
        let mut chapter = Chapter::new();
        chapter.set(0, b"abc".to_vec());
        chapter.set(40, value(3000, 0));
        assert!(chapter.requires_trim());

        let read = round_trip(&chapter);
        assert!(chapter.requires_trim());
        assert_eq!(read.len(), 41);
        assert_eq!(read.get(0), b"abc");
        assert_eq!(read.get(40), value(3000, 0).as_slice());
        assert!(read.get(20).is_empty());
    }

    #[test]
    fn test_truncate() {
        let mut chapter = Chapter::new();
        for i in 0..70 {
            chapter.set(i, value(4, i as u8));
        }
        chapter.set(65, value(2500, 9));
        chapter.trim();

        chapter.truncate(33);
        assert_eq!(chapter.len(), 33);
        assert_eq!(chapter.large_value_count(), 0);
        assert_eq!(chapter.get(32), value(4, 32).as_slice());
        assert!(chapter.get(33).is_empty());

        chapter.set(40, b"x".to_vec());
        chapter.trim();
        assert_eq!(chapter.get(32), value(4, 32).as_slice());
        assert!(chapter.get(35).is_empty());
        assert_eq!(chapter.get(40), b"x");
    }

    #[test]
    fn test_corrupt_offsets_rejected() {
        let doc = br#"{"ValueEnd": [2, 9], "SmallValues": [1, 2, 3]}"#;
        let mut read = Chapter::<u8>::new();
        let err = from_bytes(&mut read, TreeFormat::Json, doc, &Default::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Format(FormatError::Corrupt(_))
        ));
    }
}
