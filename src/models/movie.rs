//! Movie records and their validation rules.

use chrono::{DateTime, Datelike, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::validation::{Validator, all_unique};

/// Movie runtime in minutes.
///
/// On the wire this is the string `"<minutes> mins"` rather than a bare
/// number, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Runtime(pub i32);

impl Serialize for Runtime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} mins", self.0))
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;

        let minutes = value
            .strip_suffix(" mins")
            .and_then(|n| n.parse::<i32>().ok())
            .ok_or_else(|| de::Error::custom("invalid runtime format"))?;

        Ok(Runtime(minutes))
    }
}

/// A single catalog entry.
///
/// `version` starts at 1 and is incremented on every successful update; it
/// backs the optimistic-concurrency check in the store.
#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

/// Validate the writable movie fields, accumulating problems in `v`.
pub fn validate_movie(v: &mut Validator, title: &str, year: i32, runtime: i32, genres: &[String]) {
    v.check(!title.is_empty(), "title", "must be provided");
    v.check(
        title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(year != 0, "year", "must be provided");
    v.check(year >= 1888, "year", "must be greater than 1888");
    v.check(
        year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(runtime != 0, "runtime", "must be provided");
    v.check(runtime > 0, "runtime", "must be a positive integer");

    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        genres.len() <= 5,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        all_unique(genres),
        "genres",
        "must contain only unique values",
    );
}
