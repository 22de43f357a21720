use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::graph::IncludeGraph;
use super::record::ResourceRecord;
use crate::error::{ConfigError, Result, ZoneError};
use crate::model::{IncludeEdge, ZoneId, ZoneKind, ZoneNode, ZoneStatus};
use crate::validation::ValidationResult;

/// Read access to zone definitions maintained by the zone CRUD layer
pub trait ZoneRepository: Send + Sync {
    /// Look up a zone; deleted zones are reported as absent
    fn zone(&self, id: ZoneId) -> Option<ZoneNode>;

    /// All non-deleted zones ordered by id
    fn zones(&self) -> Vec<ZoneNode>;

    fn active_masters(&self) -> Vec<ZoneNode> {
        self.zones()
            .into_iter()
            .filter(|z| z.kind == ZoneKind::Master && z.is_active())
            .collect()
    }
}

/// Record accessor: the resource-record rows of one zone, in stored order
pub trait RecordSource: Send + Sync {
    fn records_for(&self, id: ZoneId) -> Vec<ResourceRecord>;
}

/// Persistence for validation verdicts
pub trait ValidationStore: Send + Sync {
    fn store_validation(&self, result: ValidationResult);

    fn latest_validation(&self, id: ZoneId) -> Option<ValidationResult>;
}

/// Shared handles to everything generation needs to read
#[derive(Clone)]
pub struct ZoneSources {
    pub zones: Arc<dyn ZoneRepository>,
    pub records: Arc<dyn RecordSource>,
    pub graph: Arc<IncludeGraph>,
}

impl ZoneSources {
    pub fn new(
        zones: Arc<dyn ZoneRepository>,
        records: Arc<dyn RecordSource>,
        graph: Arc<IncludeGraph>,
    ) -> Self {
        Self {
            zones,
            records,
            graph,
        }
    }

    /// Use one catalog as both zone repository and record accessor
    pub fn from_catalog(catalog: Arc<MemoryCatalog>, graph: Arc<IncludeGraph>) -> Self {
        Self {
            zones: catalog.clone(),
            records: catalog,
            graph,
        }
    }

    pub fn zone(&self, id: ZoneId) -> Result<ZoneNode> {
        self.zones.zone(id).ok_or(ZoneError::NotFound(id))
    }
}

/// In-memory catalog of zones, records and validation history
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    zones: RwLock<BTreeMap<ZoneId, ZoneNode>>,
    records: RwLock<HashMap<ZoneId, Vec<ResourceRecord>>>,
    validations: RwLock<HashMap<ZoneId, Vec<ValidationResult>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a zone
    pub fn insert_zone(&self, zone: ZoneNode) {
        debug!(zone_id = zone.id, zone_name = %zone.name, "Storing zone");
        self.zones.write().insert(zone.id, zone);
    }

    pub fn set_status(&self, id: ZoneId, status: ZoneStatus) -> Result<()> {
        let mut zones = self.zones.write();
        let zone = zones.get_mut(&id).ok_or(ZoneError::NotFound(id))?;
        info!(zone_id = id, old = ?zone.status, new = ?status, "Zone status changed");
        zone.status = status;
        Ok(())
    }

    pub fn set_records(&self, id: ZoneId, records: Vec<ResourceRecord>) {
        self.records.write().insert(id, records);
    }

    pub fn add_record(&self, id: ZoneId, record: ResourceRecord) {
        self.records.write().entry(id).or_default().push(record);
    }

    /// Every stored verdict for a zone, oldest first
    pub fn validation_history(&self, id: ZoneId) -> Vec<ValidationResult> {
        self.validations
            .read()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }
}

impl ZoneRepository for MemoryCatalog {
    fn zone(&self, id: ZoneId) -> Option<ZoneNode> {
        self.zones
            .read()
            .get(&id)
            .filter(|z| z.status != ZoneStatus::Deleted)
            .cloned()
    }

    fn zones(&self) -> Vec<ZoneNode> {
        self.zones
            .read()
            .values()
            .filter(|z| z.status != ZoneStatus::Deleted)
            .cloned()
            .collect()
    }
}

impl RecordSource for MemoryCatalog {
    fn records_for(&self, id: ZoneId) -> Vec<ResourceRecord> {
        self.records.read().get(&id).cloned().unwrap_or_default()
    }
}

impl ValidationStore for MemoryCatalog {
    fn store_validation(&self, result: ValidationResult) {
        self.validations
            .write()
            .entry(result.zone_id)
            .or_default()
            .push(result);
    }

    fn latest_validation(&self, id: ZoneId) -> Option<ValidationResult> {
        self.validations
            .read()
            .get(&id)
            .and_then(|history| history.last().cloned())
    }
}

/// A zone together with its records, as stored in a catalog snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEntry {
    #[serde(flatten)]
    pub zone: ZoneNode,
    #[serde(default)]
    pub records: Vec<ResourceRecord>,
}

/// Serializable snapshot of zones, their records and include edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
    #[serde(default)]
    pub includes: Vec<IncludeEdge>,
}

impl CatalogSnapshot {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ZoneError::Config(ConfigError::ParseError(e.to_string())))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading zone catalog: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Capture the current state of a catalog and graph
    pub fn capture(catalog: &MemoryCatalog, graph: &IncludeGraph) -> Self {
        let zones = catalog
            .zones
            .read()
            .values()
            .map(|zone| ZoneEntry {
                records: catalog.records_for(zone.id),
                zone: zone.clone(),
            })
            .collect();
        Self {
            zones,
            includes: graph.edges(),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ZoneError::Config(ConfigError::ParseError(e.to_string())))
    }

    pub fn into_parts(self) -> (MemoryCatalog, IncludeGraph) {
        let catalog = MemoryCatalog::new();
        for entry in self.zones {
            let id = entry.zone.id;
            catalog.insert_zone(entry.zone);
            catalog.set_records(id, entry.records);
        }
        let graph = IncludeGraph::from_edges(self.includes);
        (catalog, graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::record::RecordData;

    const SNAPSHOT: &str = r#"
[[zones]]
id = 1
name = "example.com"
filename = "db.example.com"
kind = "master"
domain = "example.com"
raw_content = "; managed"

[zones.soa]
rname = "admin@example.com"
refresh = 7200

[[zones.records]]
name = "www"
type = "A"
address = "192.0.2.10"

[[zones.records]]
name = "@"
ttl = 600
type = "MX"
preference = 10
exchange = "mail.example.com."

[[zones]]
id = 2
name = "common"
filename = "common.inc"
directory = "includes"
kind = "include"

[[includes]]
parent_id = 1
include_id = 2
position = 0
"#;

    #[test]
    fn test_snapshot_parsing() {
        let snapshot = CatalogSnapshot::from_toml_str(SNAPSHOT).unwrap();
        assert_eq!(snapshot.zones.len(), 2);
        assert_eq!(snapshot.includes.len(), 1);

        let (catalog, graph) = snapshot.into_parts();
        let master = catalog.zone(1).unwrap();
        assert_eq!(master.soa.refresh, Some(7200));
        assert_eq!(master.soa.retry, None);
        assert_eq!(master.status, ZoneStatus::Active);

        let records = catalog.records_for(1);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].data,
            RecordData::Mx {
                preference: 10,
                exchange: "mail.example.com.".to_string()
            }
        );
        assert_eq!(records[1].ttl, Some(600));
        assert_eq!(graph.include_count(1), 1);
    }

    #[test]
    fn test_deleted_zones_are_hidden() {
        let catalog = MemoryCatalog::new();
        catalog.insert_zone(ZoneNode::master(1, "a.test", "a.test"));
        catalog.insert_zone(ZoneNode::master(2, "b.test", "b.test"));
        catalog.set_status(2, ZoneStatus::Deleted).unwrap();

        assert!(catalog.zone(2).is_none());
        assert_eq!(catalog.zones().len(), 1);
        assert_eq!(catalog.active_masters().len(), 1);
    }

    #[test]
    fn test_inactive_masters_not_listed() {
        let catalog = MemoryCatalog::new();
        catalog.insert_zone(ZoneNode::master(1, "a.test", "a.test"));
        catalog.insert_zone(ZoneNode::master(2, "b.test", "b.test").with_status(ZoneStatus::Inactive));
        catalog.insert_zone(ZoneNode::include(3, "c"));

        let masters: Vec<ZoneId> = catalog.active_masters().iter().map(|z| z.id).collect();
        assert_eq!(masters, vec![1]);
    }

    #[test]
    fn test_capture_roundtrips_through_toml() {
        let (catalog, graph) = CatalogSnapshot::from_toml_str(SNAPSHOT)
            .unwrap()
            .into_parts();
        let captured = CatalogSnapshot::capture(&catalog, &graph);
        let text = captured.to_toml_string().unwrap();
        let reparsed = CatalogSnapshot::from_toml_str(&text).unwrap();
        assert_eq!(reparsed, captured);
    }
}
