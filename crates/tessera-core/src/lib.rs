//! # Tessera
//!
//! An embeddable struct-of-arrays column engine.
//!
//! Records are stored one column per field, shared by every row of a table,
//! and persisted to a compact, self-describing tree format that lets older
//! and newer schema versions read each other's data.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tessera_core::column::FieldType;
//! use tessera_core::io::{TreeFormat, TreeSerializationSettings};
//! use tessera_core::model::Database;
//! use tessera_core::value::Value;
//!
//! let mut db = Database::new("people");
//! db.create_table("Person")
//!     .column("Age", FieldType::I32)
//!     .column("Name", FieldType::String)
//!     .execute()
//!     .unwrap();
//!
//! let person = db.table_mut("Person").unwrap();
//! let row = person.add();
//! person.set_value(row, "Name", Value::from("Scott")).unwrap();
//! person.set_value(row, "Age", Value::I32(39)).unwrap();
//!
//! db.save("people.tsoa", TreeFormat::Binary).unwrap();
//!
//! let mut copy = Database::new("people");
//! copy.create_table("Person")
//!     .column("Name", FieldType::String)
//!     .execute()
//!     .unwrap();
//! copy.load("people.tsoa", TreeFormat::Binary, &TreeSerializationSettings::default())
//!     .unwrap();
//! ```

pub mod collections;
pub mod column;
pub mod error;
pub mod io;
pub mod model;
pub mod types;
pub mod value;
