//! Attaching coordinates to addresses.
//!
//! Two joins happen here. The first sends distinct addresses to a
//! [`GeocodingProvider`] and records what came back. The second attaches
//! the manually corrected [`ResolvedLocation`] table to every normalized
//! mention. Both are left joins: a miss yields `None`, never a dropped row.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{AnalyticRow, Coordinates, GeolocatedAddress, NormalizedMention, ResolvedLocation};
use crate::tables;

/// Synchronous address lookup. Real geocoding services sit behind this.
pub trait GeocodingProvider {
    fn lookup(&self, address: &str) -> Option<Coordinates>;
}

/// Serves lookups from a pre-computed address table.
#[derive(Debug, Clone, Default)]
pub struct LookupTableGeocoder {
    entries: BTreeMap<String, Option<Coordinates>>,
}

impl LookupTableGeocoder {
    pub fn new(entries: BTreeMap<String, Option<Coordinates>>) -> Self {
        Self { entries }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(tables::read_geocode_lookup(path)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeocodingProvider for LookupTableGeocoder {
    fn lookup(&self, address: &str) -> Option<Coordinates> {
        self.entries.get(address).copied().flatten()
    }
}

pub fn geocode_addresses(
    addresses: &[String],
    provider: &dyn GeocodingProvider,
) -> Vec<GeolocatedAddress> {
    let geolocated: Vec<GeolocatedAddress> = addresses
        .iter()
        .map(|address| {
            let coordinates = provider.lookup(address);
            GeolocatedAddress {
                address: address.clone(),
                latitude: coordinates.map(|c| c.latitude),
                longitude: coordinates.map(|c| c.longitude),
            }
        })
        .collect();

    let unmatched = geolocated
        .iter()
        .filter(|row| row.latitude.is_none())
        .count();
    if unmatched > 0 {
        warn!(unmatched, "addresses without coordinates; correct them manually");
    }
    info!(addresses = geolocated.len(), "geocoded addresses");
    geolocated
}

/// The manually corrected address table, unique by address.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLocationTable {
    by_address: BTreeMap<String, ResolvedLocation>,
}

impl ResolvedLocationTable {
    /// Builds the table from rows whose addresses are already unique, as
    /// [`tables::read_resolved`] guarantees.
    pub fn new(rows: Vec<ResolvedLocation>) -> Self {
        let count = rows.len();
        let by_address: BTreeMap<String, ResolvedLocation> = rows
            .into_iter()
            .map(|row| (row.address.clone(), row))
            .collect();
        debug_assert_eq!(
            by_address.len(),
            count,
            "resolved-location addresses must be unique"
        );
        Self { by_address }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(tables::read_resolved(path)?))
    }

    pub fn get(&self, address: &str) -> Option<&ResolvedLocation> {
        self.by_address.get(address)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

pub fn join_resolved(
    mentions: &[NormalizedMention],
    table: &ResolvedLocationTable,
) -> Vec<AnalyticRow> {
    let rows: Vec<AnalyticRow> = mentions
        .iter()
        .map(|mention| AnalyticRow {
            mention: mention.clone(),
            resolved: table.get(&mention.address).cloned(),
        })
        .collect();

    let unresolved = rows
        .iter()
        .filter(|row| row.resolved.is_none() && !row.mention.address.is_empty())
        .count();
    if unresolved > 0 {
        warn!(unresolved, "mentions missing from the resolved-location table");
    }
    rows
}
