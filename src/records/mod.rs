// ABOUTME: Typed record schemas for the movie catalog tables
// ABOUTME: Declares table order, column lists, and conflict keys shared by reader and writer

pub mod entities;
pub mod value;

pub use entities::{FilmWork, FilmWorkType, Genre, GenreFilmWork, Person, PersonFilmWork};
pub use value::FieldValue;

use anyhow::{bail, Result};
use std::fmt;

/// Storage type of a column, used to check that records and schemas agree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Float,
    Date,
    Timestamp,
}

/// One column of a table schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn required(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        nullable: false,
    }
}

const fn optional(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        nullable: true,
    }
}

const GENRE_COLUMNS: &[Column] = &[
    required("id", ColumnKind::Uuid),
    required("name", ColumnKind::Text),
    optional("description", ColumnKind::Text),
    required("created", ColumnKind::Timestamp),
    required("modified", ColumnKind::Timestamp),
];

const PERSON_COLUMNS: &[Column] = &[
    required("id", ColumnKind::Uuid),
    required("full_name", ColumnKind::Text),
    required("created", ColumnKind::Timestamp),
    required("modified", ColumnKind::Timestamp),
];

const FILM_WORK_COLUMNS: &[Column] = &[
    required("id", ColumnKind::Uuid),
    required("title", ColumnKind::Text),
    optional("description", ColumnKind::Text),
    optional("creation_date", ColumnKind::Date),
    optional("rating", ColumnKind::Float),
    required("type", ColumnKind::Text),
    optional("certificate", ColumnKind::Text),
    optional("file_path", ColumnKind::Text),
    required("created", ColumnKind::Timestamp),
    required("modified", ColumnKind::Timestamp),
];

const GENRE_FILM_WORK_COLUMNS: &[Column] = &[
    required("id", ColumnKind::Uuid),
    required("film_work_id", ColumnKind::Uuid),
    required("genre_id", ColumnKind::Uuid),
    required("created", ColumnKind::Timestamp),
];

const PERSON_FILM_WORK_COLUMNS: &[Column] = &[
    required("id", ColumnKind::Uuid),
    required("film_work_id", ColumnKind::Uuid),
    required("person_id", ColumnKind::Uuid),
    required("role", ColumnKind::Text),
    required("created", ColumnKind::Timestamp),
];

/// The five catalog tables
///
/// Variants are declared in load order: parent tables come before the
/// junction tables that reference them. `Table::ALL` and `Ord` both follow
/// that order, and the writer refuses pages that go backwards in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Genre,
    Person,
    FilmWork,
    GenreFilmWork,
    PersonFilmWork,
}

impl Table {
    /// All tables in load order
    pub const ALL: [Table; 5] = [
        Table::Genre,
        Table::Person,
        Table::FilmWork,
        Table::GenreFilmWork,
        Table::PersonFilmWork,
    ];

    /// Table name, identical in the source and destination databases
    pub fn name(self) -> &'static str {
        match self {
            Table::Genre => "genre",
            Table::Person => "person",
            Table::FilmWork => "film_work",
            Table::GenreFilmWork => "genre_film_work",
            Table::PersonFilmWork => "person_film_work",
        }
    }

    /// Columns in destination column order
    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Genre => GENRE_COLUMNS,
            Table::Person => PERSON_COLUMNS,
            Table::FilmWork => FILM_WORK_COLUMNS,
            Table::GenreFilmWork => GENRE_FILM_WORK_COLUMNS,
            Table::PersonFilmWork => PERSON_FILM_WORK_COLUMNS,
        }
    }

    pub fn column_names(self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    /// Columns of the unique constraint that `ON CONFLICT` targets
    ///
    /// Plain tables are keyed by primary key. Junction tables are keyed by
    /// their composite unique constraint, so a link re-read under a new id
    /// still collapses onto the existing row.
    pub fn conflict_key(self) -> &'static [&'static str] {
        match self {
            Table::Genre | Table::Person | Table::FilmWork => &["id"],
            Table::GenreFilmWork => &["film_work_id", "genre_id"],
            Table::PersonFilmWork => &["film_work_id", "person_id", "role"],
        }
    }

    /// Largest column count over all tables
    pub fn max_columns() -> usize {
        Self::ALL
            .iter()
            .map(|t| t.columns().len())
            .max()
            .unwrap_or(0)
    }

    /// Check that `values` fit this table's columns
    ///
    /// The count must match, each value must be of its column's kind, and
    /// nulls are only allowed in nullable columns.
    pub fn check_values(self, values: &[FieldValue]) -> Result<()> {
        let columns = self.columns();
        if values.len() != columns.len() {
            bail!(
                "Table '{}' has {} columns but the record has {} values",
                self,
                columns.len(),
                values.len()
            );
        }

        for (value, column) in values.iter().zip(columns) {
            if value.kind() != column.kind {
                bail!(
                    "Column '{}.{}' expects {:?}, got {:?}",
                    self,
                    column.name,
                    column.kind,
                    value.kind()
                );
            }
            if value.is_null() && !column.nullable {
                bail!("Column '{}.{}' cannot be null", self, column.name);
            }
        }

        Ok(())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed row of one of the catalog tables
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Genre(Genre),
    Person(Person),
    FilmWork(FilmWork),
    GenreFilmWork(GenreFilmWork),
    PersonFilmWork(PersonFilmWork),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Genre(_) => Table::Genre,
            Record::Person(_) => Table::Person,
            Record::FilmWork(_) => Table::FilmWork,
            Record::GenreFilmWork(_) => Table::GenreFilmWork,
            Record::PersonFilmWork(_) => Table::PersonFilmWork,
        }
    }

    /// Column values in the table's declared column order
    pub fn values(&self) -> Vec<FieldValue> {
        match self {
            Record::Genre(r) => r.values(),
            Record::Person(r) => r.values(),
            Record::FilmWork(r) => r.values(),
            Record::GenreFilmWork(r) => r.values(),
            Record::PersonFilmWork(r) => r.values(),
        }
    }
}

/// One page of records read from a single source table
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub table: Table,
    pub records: Vec<Record>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
