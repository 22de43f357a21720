pub mod graph;
pub mod names;
pub mod record;
pub mod serial;
pub mod store;
pub mod synth;

pub use graph::{IncludeGraph, Visit};
pub use names::{format_soa_rname, include_path, normalize_fqdn, normalize_mname, relative_path};
pub use record::{RecordData, RecordType, ResourceRecord};
pub use serial::{SerialGenerator, published_serial};
pub use store::{
    CatalogSnapshot, MemoryCatalog, RecordSource, ValidationStore, ZoneRepository, ZoneSources,
};
pub use synth::{EmitMode, GeneratedArtifact, ZoneSynthesizer, sanitize_zone_text};

/// Zone constants
pub mod constants {
    /// Default TTL if not specified (1 hour)
    pub const DEFAULT_TTL: u32 = 3600;

    /// SOA refresh when unset (3 hours)
    pub const DEFAULT_REFRESH: u32 = 10800;

    /// SOA retry when unset (15 minutes)
    pub const DEFAULT_RETRY: u32 = 900;

    /// SOA expire when unset (1 week)
    pub const DEFAULT_EXPIRE: u32 = 604800;

    /// SOA negative-caching minimum when unset (1 hour)
    pub const DEFAULT_MINIMUM: u32 = 3600;
}
