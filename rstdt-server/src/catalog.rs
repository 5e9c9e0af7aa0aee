//! Catalog lookup.
//!
//! The session handler only sees [`CatalogProvider`]. Resource ids on the wire
//! are positions in the provider's ordered resource list.

use parking_lot::RwLock;
use rstdt_protocol::{
    pack_entry, pack_entry_with, PriceRange, ProtocolError, QuantizePolicy, Record, MAX_RESOURCES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("too many resources: {count} (max {max})")]
    TooManyResources { count: usize, max: usize },

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("invalid record {id} in '{resource}': {source}")]
    InvalidRecord {
        resource: String,
        id: u8,
        #[source]
        source: ProtocolError,
    },

    #[error("failed to read catalog file '{}': {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse catalog file '{}': {1}", .0.display())]
    Parse(PathBuf, String),
}

/// Source of records for search requests.
pub trait CatalogProvider: Send + Sync {
    /// Returns the resource names in their fixed addressing order.
    fn resource_names(&self) -> Vec<String>;

    /// Resolves a wire resource id to its name.
    fn resource_name(&self, resource_id: u8) -> Option<String> {
        self.resource_names().into_iter().nth(resource_id as usize)
    }

    /// Returns the records of `resource` with `price_min <= price <= price_max`,
    /// in the catalog's own order. Unknown resources yield no records.
    fn search(&self, resource: &str, price_min: u16, price_max: u16) -> Vec<Record>;
}

/// A named, ordered collection of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Resource {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// In-memory catalog with a stable resource order.
pub struct InMemoryCatalog {
    resources: RwLock<Vec<Resource>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(Vec::new()),
        }
    }

    /// Creates a catalog from resources, validating every record.
    pub fn from_resources(resources: Vec<Resource>) -> Result<Self, CatalogError> {
        let catalog = Self::new();
        for resource in resources {
            catalog.add_resource(resource)?;
        }
        Ok(catalog)
    }

    /// Loads a catalog from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(path.to_path_buf(), e))?;
        let file: CatalogFile = serde_yaml::from_str(&content)
            .map_err(|e| CatalogError::Parse(path.to_path_buf(), e.to_string()))?;
        Self::from_resources(file.resources)
    }

    /// Returns the bundled hotel catalog.
    pub fn sample() -> Self {
        let hotels = Resource::new(
            "hotels",
            vec![
                Record::new(1, 250, 5, 0b1111),
                Record::new(2, 150, 3, 0b1010),
                Record::new(3, 75, 2, 0b1000),
                Record::new(4, 300, 4, 0b1101),
                Record::new(5, 350, 5, 0b1111),
            ],
        );
        Self {
            resources: RwLock::new(vec![hotels]),
        }
    }

    /// Appends a resource and returns its wire id.
    pub fn add_resource(&self, resource: Resource) -> Result<u8, CatalogError> {
        for record in &resource.records {
            validate_record(&resource.name, record)?;
        }

        let mut resources = self.resources.write();
        if resources.iter().any(|r| r.name == resource.name) {
            return Err(CatalogError::DuplicateResource(resource.name));
        }
        if resources.len() >= MAX_RESOURCES {
            return Err(CatalogError::TooManyResources {
                count: resources.len() + 1,
                max: MAX_RESOURCES,
            });
        }

        resources.push(resource);
        Ok((resources.len() - 1) as u8)
    }

    /// Appends a record to an existing resource.
    pub fn insert_record(&self, resource: &str, record: Record) -> Result<(), CatalogError> {
        validate_record(resource, &record)?;

        let mut resources = self.resources.write();
        let entry = resources
            .iter_mut()
            .find(|r| r.name == resource)
            .ok_or_else(|| CatalogError::UnknownResource(resource.to_string()))?;
        entry.records.push(record);
        Ok(())
    }

    /// Returns the number of resources.
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }

    /// Returns the total number of records across resources.
    pub fn record_count(&self) -> usize {
        self.resources.read().iter().map(|r| r.records.len()).sum()
    }

    /// Checks every record packs under `policy`.
    ///
    /// Under [`QuantizePolicy::Strict`] a record whose rating or amenities
    /// are missing from the lookup tables would fail every search that
    /// matches it, so this is run once before serving.
    pub fn validate_policy(&self, policy: QuantizePolicy) -> Result<(), CatalogError> {
        let resources = self.resources.read();
        for resource in resources.iter() {
            for record in &resource.records {
                pack_entry_with(record, policy).map_err(|source| CatalogError::InvalidRecord {
                    resource: resource.name.clone(),
                    id: record.id,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Returns `(resource, record)` pairs whose rating or amenities change on the wire.
    pub fn lossy_records(&self) -> Vec<(String, Record)> {
        self.resources
            .read()
            .iter()
            .flat_map(|r| {
                r.records
                    .iter()
                    .filter(|record| !record.is_exactly_representable())
                    .map(move |record| (r.name.clone(), *record))
            })
            .collect()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn resource_names(&self) -> Vec<String> {
        self.resources.read().iter().map(|r| r.name.clone()).collect()
    }

    fn resource_name(&self, resource_id: u8) -> Option<String> {
        self.resources
            .read()
            .get(resource_id as usize)
            .map(|r| r.name.clone())
    }

    fn search(&self, resource: &str, price_min: u16, price_max: u16) -> Vec<Record> {
        let range = PriceRange::new(price_min, price_max);
        self.resources
            .read()
            .iter()
            .find(|r| r.name == resource)
            .map(|r| {
                r.records
                    .iter()
                    .filter(|record| range.contains(record.price))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Records must at least fit the wire id field.
fn validate_record(resource: &str, record: &Record) -> Result<(), CatalogError> {
    pack_entry(record)
        .map(|_| ())
        .map_err(|source| CatalogError::InvalidRecord {
            resource: resource.to_string(),
            id: record.id,
            source,
        })
}
