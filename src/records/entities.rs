// ABOUTME: Typed catalog entities: genres, persons, film works, and their links
// ABOUTME: Each entity binds from a SQLite row by column name and emits values in column order

use crate::sqlite::converter::{
    read_optional_date, read_optional_float, read_optional_text, read_text, read_timestamp,
    read_uuid,
};
use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Genre {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_uuid(row, "id")?,
            name: read_text(row, "name")?,
            description: read_optional_text(row, "description")?,
            created: read_timestamp(row, "created")?,
            modified: read_timestamp(row, "modified")?,
        })
    }

    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.description.clone().into(),
            self.created.into(),
            self.modified.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Person {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_uuid(row, "id")?,
            full_name: read_text(row, "full_name")?,
            created: read_timestamp(row, "created")?,
            modified: read_timestamp(row, "modified")?,
        })
    }

    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.full_name.clone().into(),
            self.created.into(),
            self.modified.into(),
        ]
    }
}

/// Kind of a film work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilmWorkType {
    Movie,
    TvShow,
}

impl FilmWorkType {
    /// Two-letter code stored in the destination `type` column
    pub fn code(self) -> &'static str {
        match self {
            FilmWorkType::Movie => "MV",
            FilmWorkType::TvShow => "TV",
        }
    }
}

impl FromStr for FilmWorkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "mv" => Ok(FilmWorkType::Movie),
            "tv_show" | "tv-show" | "tvshow" | "tv" => Ok(FilmWorkType::TvShow),
            other => bail!("Unknown film work type '{}'", other),
        }
    }
}

impl fmt::Display for FilmWorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilmWork {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub kind: FilmWorkType,
    pub certificate: Option<String>,
    pub file_path: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FilmWork {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_uuid(row, "id")?,
            title: read_text(row, "title")?,
            description: read_optional_text(row, "description")?,
            creation_date: read_optional_date(row, "creation_date")?,
            rating: read_optional_float(row, "rating")?,
            kind: read_text(row, "type")?.parse()?,
            certificate: read_optional_text(row, "certificate")?,
            file_path: read_optional_text(row, "file_path")?,
            created: read_timestamp(row, "created")?,
            modified: read_timestamp(row, "modified")?,
        })
    }

    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.title.clone().into(),
            self.description.clone().into(),
            self.creation_date.into(),
            self.rating.into(),
            self.kind.code().to_string().into(),
            self.certificate.clone().into(),
            self.file_path.clone().into(),
            self.created.into(),
            self.modified.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
    pub created: DateTime<Utc>,
}

impl GenreFilmWork {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_uuid(row, "id")?,
            film_work_id: read_uuid(row, "film_work_id")?,
            genre_id: read_uuid(row, "genre_id")?,
            created: read_timestamp(row, "created")?,
        })
    }

    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.genre_id.into(),
            self.created.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: String,
    pub created: DateTime<Utc>,
}

impl PersonFilmWork {
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: read_uuid(row, "id")?,
            film_work_id: read_uuid(row, "film_work_id")?,
            person_id: read_uuid(row, "person_id")?,
            role: read_text(row, "role")?,
            created: read_timestamp(row, "created")?,
        })
    }

    pub fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.person_id.into(),
            self.role.clone().into(),
            self.created.into(),
        ]
    }
}
