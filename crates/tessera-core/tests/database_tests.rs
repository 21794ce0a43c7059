//! Integration tests for tessera-core: build a database, persist it, read it back.

use tempfile::tempdir;

use tessera_core::collections::DictionaryColumn;
use tessera_core::column::{Column, FieldType, RefColumn, RefListColumn, StringColumn};
use tessera_core::io::{SizeUnit, TreeFormat, TreeSerializationSettings};
use tessera_core::model::Database;
use tessera_core::value::Value;

fn people() -> Database {
    let mut db = Database::new("people");
    db.create_table("Person")
        .column("Age", FieldType::I32)
        .column("Name", FieldType::String)
        .execute()
        .unwrap();
    db
}

fn add_person(db: &mut Database, age: i32, name: &str) -> usize {
    let table = db.table_mut("Person").unwrap();
    let row = table.add();
    table.set_value(row, "Age", Value::I32(age)).unwrap();
    table.set_value(row, "Name", Value::from(name)).unwrap();
    row
}

fn round_trip(db: &Database, format: TreeFormat) -> Database {
    let mut buf = Vec::new();
    db.write_to(&mut buf, format).unwrap();
    let mut read = people();
    read.read_from(buf.as_slice(), format, &TreeSerializationSettings::default())
        .unwrap();
    read
}

#[test]
fn test_scott_and_adam_round_trip() {
    let mut db = people();
    add_person(&mut db, 39, "Scott");
    add_person(&mut db, 4, "Adam");

    for format in [TreeFormat::Binary, TreeFormat::Json] {
        let read = round_trip(&db, format);
        let person = read.table("Person").unwrap();
        assert_eq!(person.len(), 2);
        assert_eq!(person.get_value(0, "Name").unwrap(), Value::from("Scott"));
        assert_eq!(person.get_value(0, "Age").unwrap(), Value::I32(39));
        assert_eq!(person.get_value(1, "Name").unwrap(), Value::from("Adam"));
        assert_eq!(person.get_value(1, "Age").unwrap(), Value::I32(4));
    }
}

#[test]
fn test_diagnostics_report_sizes() {
    let mut db = people();
    add_person(&mut db, 39, "Scott");
    add_person(&mut db, 4, "Adam");
    let mut buf = Vec::new();
    db.write_to(&mut buf, TreeFormat::Binary).unwrap();

    let mut read = people();
    let diagnostics = read
        .read_with_diagnostics(buf.as_slice(), TreeFormat::Binary, &Default::default())
        .unwrap();

    assert_eq!(diagnostics.name, "Database");
    let person = diagnostics.child("Person").unwrap();
    assert_eq!(person.children[0].name, "Columns");
    assert_eq!(person.children[0].children.len(), 2);
    assert!(person.size > person.children[0].size);
    assert!(diagnostics.size >= person.size);
    assert_eq!(diagnostics.unit, SizeUnit::Bytes);
    assert_eq!(read.table("Person").unwrap().len(), 2);

    let text = diagnostics.to_string();
    assert!(text.contains("Person"));
    assert!(text.contains("    Age"));
}

#[test]
fn test_trim_then_clear() {
    let mut db = people();
    add_person(&mut db, 39, "Scott");
    add_person(&mut db, 4, "Adam");

    db.trim();
    let person = db.table("Person").unwrap();
    assert_eq!(person.get_value(1, "Name").unwrap(), Value::from("Adam"));

    db.clear();
    let person = db.table("Person").unwrap();
    assert_eq!(person.len(), 0);
    assert_eq!(person.get_value(0, "Age").unwrap(), Value::I32(0));
    assert_eq!(person.get_value(0, "Name").unwrap(), Value::from(""));
}

#[test]
fn test_save_and_load_file() {
    let dir = tempdir().unwrap();
    let mut db = people();
    for i in 0..1000 {
        add_person(&mut db, i, &format!("person {i}"));
    }

    for format in [TreeFormat::Binary, TreeFormat::Json] {
        let path = dir.path().join(format!("people.{}", format.extension()));
        db.save(&path, format).unwrap();

        let mut read = people();
        read.load(&path, format, &Default::default()).unwrap();
        let person = read.table("Person").unwrap();
        assert_eq!(person.len(), 1000);
        assert_eq!(person.get_value(999, "Name").unwrap(), Value::from("person 999"));
        let names = person.column::<StringColumn>("Name").unwrap();
        assert_eq!(names.get_str(500), "person 500");

        let diagnostics = read.load_with_diagnostics(&path, format, &Default::default()).unwrap();
        assert!(diagnostics.child("Person").is_some());
    }
}

#[test]
fn test_corrupt_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.tsoa");
    let mut db = people();
    add_person(&mut db, 39, "Scott");
    db.save(&path, TreeFormat::Binary).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes.windows(5).position(|w| w == b"Scott").unwrap();
    bytes[at] = b'Z';
    std::fs::write(&path, &bytes).unwrap();

    let mut read = people();
    assert!(read.load(&path, TreeFormat::Binary, &Default::default()).is_err());

    let lenient = TreeSerializationSettings {
        verify_checksum: false,
        ..Default::default()
    };
    read.load(&path, TreeFormat::Binary, &lenient).unwrap();
    assert_eq!(
        read.table("Person").unwrap().get_value(0, "Name").unwrap(),
        Value::from("Zcott")
    );
}

#[test]
fn test_references_between_tables() {
    let mut db = people();
    db.create_table("Family")
        .column("Surname", FieldType::Distinct(Box::new(FieldType::String)))
        .typed_column("Head", RefColumn::new("Person"))
        .typed_column("Members", RefListColumn::new("Person"))
        .execute()
        .unwrap();
    let scott = add_person(&mut db, 39, "Scott");
    let adam = add_person(&mut db, 4, "Adam");

    let person = db.table("Person").unwrap();
    let resolver = person.resolver();
    let scott = person.row(scott).unwrap();
    let adam = person.row(adam).unwrap();

    let family = db.table_mut("Family").unwrap();
    let row = family.add();
    family.set_value(row, "Surname", Value::from("Louvau")).unwrap();
    family
        .column_mut::<RefColumn>("Head")
        .unwrap()
        .set_row(row, Some(scott), &resolver)
        .unwrap();
    {
        let members = family.column_mut::<RefListColumn>("Members").unwrap();
        let mut list = members.typed_list_mut(row, resolver);
        list.push(Some(scott)).unwrap();
        list.push(Some(adam)).unwrap();
    }
    db.validate_references().unwrap();

    let mut buf = Vec::new();
    db.write_to(&mut buf, TreeFormat::Binary).unwrap();
    let mut read = people();
    read.create_table("Family")
        .column("Surname", FieldType::Distinct(Box::new(FieldType::String)))
        .typed_column("Head", RefColumn::new("Person"))
        .typed_column("Members", RefListColumn::new("Person"))
        .execute()
        .unwrap();
    read.read_from(buf.as_slice(), TreeFormat::Binary, &Default::default())
        .unwrap();
    read.validate_references().unwrap();

    let person = read.table("Person").unwrap();
    let family = read.table("Family").unwrap();
    let head = family
        .column::<RefColumn>("Head")
        .unwrap()
        .get_row(0, &person.resolver())
        .unwrap()
        .unwrap();
    assert_eq!(person.value(head, "Name").unwrap(), Value::from("Scott"));

    let members = family.column::<RefListColumn>("Members").unwrap();
    let names: Vec<Value> = members
        .typed_list(0, person.resolver())
        .to_vec()
        .unwrap()
        .into_iter()
        .map(|row| person.value(row.unwrap(), "Name").unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("Scott"), Value::from("Adam")]);
    assert_eq!(family.get_value(0, "Surname").unwrap(), Value::from("Louvau"));
}

#[test]
fn test_typed_dictionary_column_in_table() {
    let mut db = Database::new("settings");
    db.create_table("Run")
        .typed_column(
            "Properties",
            DictionaryColumn::new(StringColumn::new(), StringColumn::new()),
        )
        .execute()
        .unwrap();

    let run = db.table_mut("Run").unwrap();
    let row = run.add();
    {
        let column = run
            .column_mut::<DictionaryColumn<StringColumn, StringColumn>>("Properties")
            .unwrap();
        let mut properties = column.dictionary_mut(row);
        properties.insert("tool".into(), "analyzer".into());
        properties.insert("version".into(), "2.1".into());
        properties.remove(&"tool".into());
        properties.insert("tool".into(), "linter".into());
        column.trim();
        assert_eq!(column.len(), 1);
    }

    let mut buf = Vec::new();
    db.write_to(&mut buf, TreeFormat::Json).unwrap();
    let mut read = Database::new("settings");
    read.create_table("Run")
        .typed_column(
            "Properties",
            DictionaryColumn::new(StringColumn::new(), StringColumn::new()),
        )
        .execute()
        .unwrap();
    read.read_from(buf.as_slice(), TreeFormat::Json, &Default::default())
        .unwrap();

    let column = read
        .table("Run")
        .unwrap()
        .column::<DictionaryColumn<StringColumn, StringColumn>>("Properties")
        .unwrap();
    let properties = column.dictionary(0);
    assert_eq!(properties.len(), 2);
    assert_eq!(properties.value(&"tool".into()).unwrap(), "linter");
    assert_eq!(properties.value(&"version".into()).unwrap(), "2.1");
}
