use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use super::constants::{DEFAULT_EXPIRE, DEFAULT_MINIMUM, DEFAULT_REFRESH, DEFAULT_RETRY};
use super::names::{
    format_soa_rname, include_path, normalize_fqdn, normalize_mname, normalize_origin,
};
use super::serial::SerialGenerator;
use super::store::ZoneSources;
use crate::error::{Result, ZoneError};
use crate::model::{ZoneId, ZoneNode};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// How descendants of the generated zone are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    /// Inline every reachable include, producing one self-contained text
    Flatten,
    /// Keep one `$INCLUDE` line per direct child; children are separate files
    Directive,
}

/// Zone-file text produced for one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedArtifact {
    pub zone_id: ZoneId,
    pub mode: EmitMode,
    /// SOA serial, present only when a header was emitted
    pub serial: Option<u32>,
    pub content: String,
}

/// Strip a leading BOM, normalize line endings and end with exactly one newline
pub fn sanitize_zone_text(text: &str) -> String {
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
    let text = text.replace("\r\n", "\n");
    let trimmed = text.trim_end_matches(['\n', '\r']);
    format!("{}\n", trimmed)
}

/// Builds zone-file text from zone attributes, record rows and the include graph
#[derive(Clone)]
pub struct ZoneSynthesizer {
    sources: ZoneSources,
    serials: Arc<SerialGenerator>,
    /// Extra NS hosts emitted after the primary
    nameservers: Vec<String>,
}

impl ZoneSynthesizer {
    pub fn new(sources: ZoneSources) -> Self {
        Self {
            sources,
            serials: Arc::new(SerialGenerator::new()),
            nameservers: Vec::new(),
        }
    }

    pub fn with_serials(mut self, serials: Arc<SerialGenerator>) -> Self {
        self.serials = serials;
        self
    }

    pub fn with_nameservers(mut self, nameservers: Vec<String>) -> Self {
        self.nameservers = nameservers;
        self
    }

    pub fn sources(&self) -> &ZoneSources {
        &self.sources
    }

    pub fn serials(&self) -> &SerialGenerator {
        &self.serials
    }

    /// Generate a zone with a freshly minted serial
    pub fn generate(&self, zone_id: ZoneId, mode: EmitMode) -> Result<GeneratedArtifact> {
        self.generate_with_serial(zone_id, mode, None)
    }

    pub fn generate_with_serial(
        &self,
        zone_id: ZoneId,
        mode: EmitMode,
        serial: Option<u32>,
    ) -> Result<GeneratedArtifact> {
        let node = self.sources.zone(zone_id)?;
        self.generate_node(&node, mode, serial)
    }

    /// Generate text for `node` as the root of a traversal.
    ///
    /// Only a master root gets the `$TTL`/`$ORIGIN`/SOA/NS header.
    pub fn generate_node(
        &self,
        node: &ZoneNode,
        mode: EmitMode,
        serial: Option<u32>,
    ) -> Result<GeneratedArtifact> {
        let mut out = String::new();

        let serial = if node.is_master() {
            let serial = serial.unwrap_or_else(|| self.serials.next());
            out.push_str(&self.header(node, serial)?);
            Some(serial)
        } else {
            None
        };

        self.push_body(&mut out, node);

        match mode {
            EmitMode::Flatten => {
                let descendants = self
                    .sources
                    .graph
                    .descendants(self.sources.zones.as_ref(), node.id);
                for child in &descendants {
                    self.push_body(&mut out, child);
                }
            }
            EmitMode::Directive => {
                let children = self
                    .sources
                    .graph
                    .active_children(self.sources.zones.as_ref(), node.id);
                if !children.is_empty() {
                    out.push('\n');
                }
                for child in &children {
                    let _ = writeln!(out, "$INCLUDE {}", include_path(child)?);
                }
            }
        }

        let content = sanitize_zone_text(&out);
        if node.is_master() && content.trim().is_empty() {
            return Err(ZoneError::Generation(format!(
                "zone {} produced no content",
                node.id
            )));
        }

        debug!(
            zone_id = node.id,
            ?mode,
            bytes = content.len(),
            "Generated zone content"
        );

        Ok(GeneratedArtifact {
            zone_id: node.id,
            mode,
            serial,
            content,
        })
    }

    /// `$TTL`, `$ORIGIN`, SOA and NS lines for a master zone
    fn header(&self, node: &ZoneNode, serial: u32) -> Result<String> {
        let origin = normalize_origin(&node.domain);
        if origin.is_empty() {
            return Err(ZoneError::Generation(format!(
                "master zone {} ({}) has no domain",
                node.id, node.name
            )));
        }

        let mut out = String::new();
        let _ = writeln!(out, "$TTL {}", node.default_ttl);
        let _ = writeln!(out, "$ORIGIN {}", origin);
        out.push('\n');
        out.push_str(&soa_record(node, serial));
        out.push('\n');

        for ns in self.nameservers_for(node) {
            let _ = writeln!(out, "@ IN NS {}", ns);
        }
        out.push('\n');
        Ok(out)
    }

    /// Primary name server first, then the configured extras, deduplicated
    fn nameservers_for(&self, node: &ZoneNode) -> Vec<String> {
        let primary = normalize_mname(node.soa.mname.as_deref().unwrap_or(""), &node.domain);
        let mut hosts = vec![primary];
        for extra in &self.nameservers {
            let host = normalize_fqdn(extra);
            if !host.is_empty() && !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        hosts
    }

    /// Raw content followed by one line per record row
    fn push_body(&self, out: &mut String, node: &ZoneNode) {
        let raw = node.raw_content.trim_start_matches(BYTE_ORDER_MARK);
        if !raw.trim().is_empty() {
            out.push_str(raw);
            if !raw.ends_with('\n') {
                out.push('\n');
            }
        }

        for record in self.sources.records.records_for(node.id) {
            out.push_str(&record.to_zone_line());
            out.push('\n');
        }
    }
}

/// Render the SOA record with defaults applied to unset timers
pub fn soa_record(node: &ZoneNode, serial: u32) -> String {
    let mname = normalize_mname(node.soa.mname.as_deref().unwrap_or(""), &node.domain);
    let rname = format_soa_rname(node.soa.rname.as_deref().unwrap_or(""), &node.domain);

    format!(
        "@ IN SOA {} {} (\n    {} ; Serial\n    {} ; Refresh\n    {} ; Retry\n    {} ; Expire\n    {} ; Minimum\n)\n",
        mname,
        rname,
        serial,
        node.soa.refresh.unwrap_or(DEFAULT_REFRESH),
        node.soa.retry.unwrap_or(DEFAULT_RETRY),
        node.soa.expire.unwrap_or(DEFAULT_EXPIRE),
        node.soa.minimum.unwrap_or(DEFAULT_MINIMUM),
    )
}
