#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Occurrence, region, grid cell, and effort record types.
//!
//! These types flow through every stage of the effort pipeline: raw
//! occurrences come out of the source loader, get enriched with a
//! calendar period, a region, and a grid cell, and are finally reduced
//! to [`EffortRecord`] rows for the report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single species observation as delivered by OBIS.
///
/// Field names on the wire (and in the occurrence cache) follow the
/// Darwin Core column names returned by the OBIS API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// WGS84 longitude in decimal degrees.
    #[serde(rename = "decimalLongitude")]
    pub longitude: f64,
    /// WGS84 latitude in decimal degrees.
    #[serde(rename = "decimalLatitude")]
    pub latitude: f64,
    /// Mid-point of the sampling event, milliseconds since the Unix epoch.
    pub date_mid: i64,
}

/// Identifier of a HAB region (the `hab_region` shapefile attribute).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque discrete global grid cell identifier.
///
/// Displays as lowercase hexadecimal, which is the canonical string form
/// of H3 cell indexes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A calendar month in the proleptic Gregorian calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    /// Calendar year.
    pub year: i32,
    /// Month of the year, 1-12.
    pub month: u32,
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// An occurrence with its derived period, region, and grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichedOccurrence {
    /// The raw observation.
    pub occurrence: Occurrence,
    /// Year and month of `date_mid`.
    pub period: YearMonth,
    /// Region the point falls in, if any.
    pub region: Option<RegionId>,
    /// Grid cell containing the point.
    pub cell: CellId,
}

/// One row of `effort.csv`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffortRecord {
    /// Short region code (e.g. `"EUR"`).
    pub hab_region: String,
    /// Calendar year.
    pub year: i32,
    /// Number of distinct (month, cell) pairs observed.
    pub effort: u64,
}

/// A region id with no entry in the name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown HAB region id {0} (not in the region name table)")]
pub struct UnknownRegion(pub RegionId);

/// A name table key that is not an integer region id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid region id key {0:?} in region name table")]
pub struct InvalidRegionKey(pub String);

/// Explicit region id to short code mapping.
///
/// Lookups are keyed, never positional: an id missing from the table is
/// an error rather than a silently shifted name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionNames {
    codes: BTreeMap<RegionId, String>,
}

impl RegionNames {
    /// Builds a name table from `(id, code)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            codes: entries
                .into_iter()
                .map(|(id, code)| (RegionId(id), code.into()))
                .collect(),
        }
    }

    /// Builds a name table from a string-keyed table, as read from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRegionKey`] if any key is not a non-negative integer.
    pub fn from_table(table: &BTreeMap<String, String>) -> Result<Self, InvalidRegionKey> {
        let mut codes = BTreeMap::new();
        for (key, code) in table {
            let id = key
                .trim()
                .parse::<u32>()
                .map_err(|_| InvalidRegionKey(key.clone()))?;
            codes.insert(RegionId(id), code.clone());
        }
        Ok(Self { codes })
    }

    /// Resolves the short code for a region id.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRegion`] if `id` has no entry.
    pub fn code(&self, id: RegionId) -> Result<&str, UnknownRegion> {
        self.codes
            .get(&id)
            .map(String::as_str)
            .ok_or(UnknownRegion(id))
    }

    /// Resolves a short code back to its region id.
    #[must_use]
    pub fn id_for_code(&self, code: &str) -> Option<RegionId> {
        self.codes
            .iter()
            .find(|(_, c)| c.eq_ignore_ascii_case(code))
            .map(|(id, _)| *id)
    }

    /// Checks every id against the table, failing on the first unknown one.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRegion`] for the smallest id with no entry.
    pub fn validate<'a, I>(&self, ids: I) -> Result<(), UnknownRegion>
    where
        I: IntoIterator<Item = &'a RegionId>,
    {
        let ids: BTreeSet<RegionId> = ids.into_iter().copied().collect();
        ids.into_iter().try_for_each(|id| self.code(id).map(|_| ()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
