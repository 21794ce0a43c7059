//! Property tests for column storage.

use proptest::prelude::*;

use tessera_core::collections::NumberListColumn;
use tessera_core::column::{Column, DistinctColumn, NumberColumn, StringColumn};
use tessera_core::io::{self, TreeFormat, TreeSerializationSettings};

fn format() -> impl Strategy<Value = TreeFormat> {
    prop_oneof![Just(TreeFormat::Binary), Just(TreeFormat::Json)]
}

fn strings() -> impl Strategy<Value = Vec<String>> {
    // Lengths straddle the small value limit so both storage paths are hit.
    prop::collection::vec(prop_oneof![".{0,8}", "[a-z]{2040,2060}"], 0..80)
}

fn fill_strings(values: &[String]) -> StringColumn {
    let mut column = StringColumn::new();
    for (i, value) in values.iter().enumerate() {
        column.set_str(i, value);
    }
    column
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_string_column_survives_round_trip(values in strings(), format in format()) {
        let column = fill_strings(&values);
        let bytes = io::to_bytes(&column, format).unwrap();
        let mut read = StringColumn::new();
        io::from_bytes(&mut read, format, &bytes, &TreeSerializationSettings::strict()).unwrap();

        prop_assert_eq!(read.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(read.get_str(i), value.as_str());
        }
    }

    #[test]
    fn test_trim_never_changes_contents(
        values in strings(),
        overwrites in prop::collection::vec((0usize..100, ".{0,40}"), 0..40),
    ) {
        let mut column = fill_strings(&values);
        for (index, value) in &overwrites {
            column.set_str(*index, value);
        }
        let before: Vec<String> = (0..column.len()).map(|i| column.get(i)).collect();

        column.trim();
        let after: Vec<String> = (0..column.len()).map(|i| column.get(i)).collect();
        prop_assert_eq!(&before, &after);

        column.trim();
        let again: Vec<String> = (0..column.len()).map(|i| column.get(i)).collect();
        prop_assert_eq!(&before, &again);
    }

    #[test]
    fn test_number_column_survives_round_trip(
        values in prop::collection::vec(any::<i64>(), 0..200),
        format in format(),
    ) {
        let column = NumberColumn::from_vec(values.clone(), -1);
        let bytes = io::to_bytes(&column, format).unwrap();
        let mut read = NumberColumn::new(-1i64);
        io::from_bytes(&mut read, format, &bytes, &Default::default()).unwrap();
        prop_assert_eq!(read.as_slice(), values.as_slice());
        prop_assert_eq!(read.get(values.len()), -1);
    }

    #[test]
    fn test_number_lists_match_model(
        rows in prop::collection::vec(prop::collection::vec(any::<u16>(), 0..20), 0..60),
    ) {
        let mut column = NumberListColumn::<u16>::new();
        for (i, row) in rows.iter().enumerate() {
            column.list_mut(i).set_to(row.iter().copied());
        }
        column.trim();
        for (i, row) in rows.iter().enumerate() {
            prop_assert_eq!(column.list(i).to_vec(), row.clone());
        }
    }

    #[test]
    fn test_distinct_column_keeps_values_past_the_cap(
        values in prop::collection::vec(0i32..600, 0..400),
        format in format(),
    ) {
        let mut column = DistinctColumn::new(NumberColumn::new(0i32));
        for (i, value) in values.iter().enumerate() {
            column.set(i, *value);
        }

        let distinct = values.iter().filter(|v| **v != 0).collect::<std::collections::HashSet<_>>().len();
        if distinct < 256 {
            prop_assert!(column.is_mapping_values());
        }
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(column.get(i), *value);
        }

        let bytes = io::to_bytes(&column, format).unwrap();
        let mut read = DistinctColumn::new(NumberColumn::new(0i32));
        io::from_bytes(&mut read, format, &bytes, &Default::default()).unwrap();
        prop_assert_eq!(read.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(read.get(i), *value);
        }
    }
}
