//! Address intelligence: AS and geolocation lookups by IP
//!
//! A provider answers a lookup with a [`Record`]. Retained records become
//! Borrowed handles: the provider keeps the only strong reference, so
//! replacing its dataset turns every outstanding handle into a null
//! reference. Records built for a single lookup become Owned handles.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::info;

use crate::config::ConfigError;
use crate::handle::Slot;

/// Autonomous system record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsRecord {
    /// AS number
    pub number: u32,
    /// Registry handle
    pub handle: String,
    /// Organization name
    pub name: String,
    /// Whether the AS belongs to a hosting provider
    pub hosting: bool,
}

impl AsRecord {
    /// Whether addresses in this AS are likely servers rather than end users
    pub fn is_hosting(&self) -> bool {
        self.hosting
    }
}

/// Geolocation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// City name
    pub city: String,
    /// State, province or region
    pub state: String,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
}

/// Lookup result, by reference or by value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<T> {
    /// Kept alive by the provider
    Retained(Arc<T>),
    /// Built for this lookup; the handle takes ownership
    Owned(T),
}

impl<T> Record<T> {
    /// Borrow the record regardless of who owns it
    pub fn get(&self) -> &T {
        match self {
            Record::Retained(value) => value,
            Record::Owned(value) => value,
        }
    }
}

impl<T> From<Record<T>> for Slot<T> {
    fn from(record: Record<T>) -> Self {
        match record {
            Record::Retained(value) => Slot::borrowed(&value),
            Record::Owned(value) => Slot::owned(value),
        }
    }
}

/// Source of address intelligence
pub trait IntelProvider: Send + Sync {
    /// AS announcing `addr`
    fn as_by_ip(&self, addr: &IpAddr) -> Option<Record<AsRecord>>;

    /// Location of `addr`
    fn location_by_ip(&self, addr: &IpAddr) -> Option<Record<Location>>;

    /// PTR name of `addr`
    fn reverse_dns(&self, addr: &IpAddr) -> Option<String>;
}

// ============================================================================
// Range table
// ============================================================================

/// Key space shared by both families; IPv4 maps into `::ffff:0:0/96`
fn address_key(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

struct RangeTable<T> {
    /// Sorted by start, non-overlapping
    ranges: Vec<(u128, u128, Arc<T>)>,
}

impl<T> Default for RangeTable<T> {
    fn default() -> Self {
        Self { ranges: Vec::new() }
    }
}

impl<T> RangeTable<T> {
    fn build(mut ranges: Vec<(u128, u128, Arc<T>)>) -> Result<Self, ConfigError> {
        ranges.sort_by_key(|(start, _, _)| *start);
        for (start, end, _) in &ranges {
            if start > end {
                return Err(ConfigError::ValidationError(format!(
                    "range start {:#x} is after its end {:#x}",
                    start, end
                )));
            }
        }
        for pair in ranges.windows(2) {
            if pair[1].0 <= pair[0].1 {
                return Err(ConfigError::ValidationError(
                    "intel dataset contains overlapping ranges".to_string(),
                ));
            }
        }
        Ok(Self { ranges })
    }

    fn lookup(&self, addr: &IpAddr) -> Option<Arc<T>> {
        let key = address_key(addr);
        let idx = self.ranges.partition_point(|(start, _, _)| *start <= key);
        let (_, end, record) = self.ranges.get(idx.checked_sub(1)?)?;
        (key <= *end).then(|| Arc::clone(record))
    }

    fn len(&self) -> usize {
        self.ranges.len()
    }
}

// ============================================================================
// Static provider
// ============================================================================

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default, rename = "as")]
    systems: Vec<RawAs>,
    #[serde(default)]
    locations: Vec<RawLocation>,
    #[serde(default)]
    reverse_dns: Vec<RawPtr>,
}

#[derive(Deserialize)]
struct RawAs {
    start: IpAddr,
    end: IpAddr,
    number: u32,
    handle: String,
    name: String,
    #[serde(default)]
    hosting: bool,
}

#[derive(Deserialize)]
struct RawLocation {
    start: IpAddr,
    end: IpAddr,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    country_code: String,
}

#[derive(Deserialize)]
struct RawPtr {
    ip: IpAddr,
    name: String,
}

#[derive(Default)]
struct Dataset {
    systems: RangeTable<AsRecord>,
    locations: RangeTable<Location>,
    reverse_dns: FxHashMap<IpAddr, String>,
}

impl Dataset {
    fn parse(json: &str) -> Result<Self, ConfigError> {
        let raw: RawDataset = serde_json::from_str(json)?;

        let systems = raw
            .systems
            .into_iter()
            .map(|r| {
                let record = AsRecord {
                    number: r.number,
                    handle: r.handle,
                    name: r.name,
                    hosting: r.hosting,
                };
                (address_key(&r.start), address_key(&r.end), Arc::new(record))
            })
            .collect();
        let locations = raw
            .locations
            .into_iter()
            .map(|r| {
                let record = Location {
                    city: r.city,
                    state: r.state,
                    country_code: r.country_code,
                };
                (address_key(&r.start), address_key(&r.end), Arc::new(record))
            })
            .collect();

        Ok(Self {
            systems: RangeTable::build(systems)?,
            locations: RangeTable::build(locations)?,
            reverse_dns: raw.reverse_dns.into_iter().map(|p| (p.ip, p.name)).collect(),
        })
    }
}

/// In-memory provider loaded from a JSON dataset.
///
/// ```json
/// {
///   "as": [{"start": "1.1.1.0", "end": "1.1.1.255", "number": 13335,
///           "handle": "CLOUDFLARENET", "name": "Cloudflare, Inc.", "hosting": true}],
///   "locations": [{"start": "1.1.1.0", "end": "1.1.1.255",
///                  "city": "Sydney", "state": "New South Wales", "country_code": "AU"}],
///   "reverse_dns": [{"ip": "1.1.1.1", "name": "one.one.one.one"}]
/// }
/// ```
#[derive(Default)]
pub struct StaticIntelProvider {
    data: RwLock<Dataset>,
}

impl StaticIntelProvider {
    /// Provider with no records; every lookup misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a dataset from JSON text
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let provider = Self::empty();
        provider.reload_from_json(json)?;
        Ok(provider)
    }

    /// Load a dataset from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let provider = Self::empty();
        provider.reload(path)?;
        Ok(provider)
    }

    /// Replace the dataset with the contents of a file
    pub fn reload(&self, path: &Path) -> Result<(), ConfigError> {
        let json = std::fs::read_to_string(path)?;
        self.reload_from_json(&json)
    }

    /// Replace the dataset. Handles to records of the old dataset become
    /// null references.
    pub fn reload_from_json(&self, json: &str) -> Result<(), ConfigError> {
        let dataset = Dataset::parse(json)?;
        info!(
            systems = dataset.systems.len(),
            locations = dataset.locations.len(),
            ptr_records = dataset.reverse_dns.len(),
            "loaded intel dataset"
        );
        let old = std::mem::replace(&mut *self.data.write(), dataset);
        drop(old);
        Ok(())
    }
}

impl IntelProvider for StaticIntelProvider {
    fn as_by_ip(&self, addr: &IpAddr) -> Option<Record<AsRecord>> {
        self.data.read().systems.lookup(addr).map(Record::Retained)
    }

    fn location_by_ip(&self, addr: &IpAddr) -> Option<Record<Location>> {
        self.data.read().locations.lookup(addr).map(Record::Retained)
    }

    fn reverse_dns(&self, addr: &IpAddr) -> Option<String> {
        self.data.read().reverse_dns.get(addr).cloned()
    }
}
