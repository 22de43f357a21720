use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a single character-string inside TXT RDATA
const MAX_CHARACTER_STRING: usize = 255;

/// Record types the synthesizer knows how to lay out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    NS,
    PTR,
    MX,
    DNAME,
    TXT,
    SRV,
    CAA,
    TLSA,
    SSHFP,
    NAPTR,
    SVCB,
    LOC,
    RP,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::MX => "MX",
            RecordType::DNAME => "DNAME",
            RecordType::TXT => "TXT",
            RecordType::SRV => "SRV",
            RecordType::CAA => "CAA",
            RecordType::TLSA => "TLSA",
            RecordType::SSHFP => "SSHFP",
            RecordType::NAPTR => "NAPTR",
            RecordType::SVCB => "SVCB",
            RecordType::LOC => "LOC",
            RecordType::RP => "RP",
        };
        f.pad(name)
    }
}

/// Typed RDATA fields as stored by the record accessor.
///
/// Values are trusted: per-field syntax checks happen before a record is
/// stored, so rendering never rejects a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RecordData {
    A {
        address: String,
    },
    Aaaa {
        address: String,
    },
    Cname {
        target: String,
    },
    Ns {
        target: String,
    },
    Ptr {
        target: String,
    },
    Mx {
        preference: u16,
        exchange: String,
    },
    Dname {
        target: String,
    },
    Txt {
        text: String,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Caa {
        flags: u8,
        tag: String,
        value: String,
    },
    Tlsa {
        usage: u8,
        selector: u8,
        matching_type: u8,
        certificate: String,
    },
    Sshfp {
        algorithm: u8,
        fp_type: u8,
        fingerprint: String,
    },
    Naptr {
        order: u16,
        preference: u16,
        flags: String,
        service: String,
        regexp: String,
        replacement: String,
    },
    Svcb {
        priority: u16,
        target: String,
        #[serde(default)]
        params: String,
    },
    Loc(LocData),
    Rp {
        mbox: String,
        txt: String,
    },
}

/// Geographic location (RFC 1876) in its presentation-format pieces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocData {
    pub lat_degrees: u8,
    #[serde(default)]
    pub lat_minutes: u8,
    #[serde(default)]
    pub lat_seconds: f64,
    pub lat_hemisphere: char,
    pub lon_degrees: u8,
    #[serde(default)]
    pub lon_minutes: u8,
    #[serde(default)]
    pub lon_seconds: f64,
    pub lon_hemisphere: char,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default = "default_loc_size")]
    pub size: f64,
    #[serde(default = "default_loc_horiz")]
    pub horiz_precision: f64,
    #[serde(default = "default_loc_vert")]
    pub vert_precision: f64,
}

fn default_loc_size() -> f64 {
    1.0
}

fn default_loc_horiz() -> f64 {
    10000.0
}

fn default_loc_vert() -> f64 {
    10.0
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A { .. } => RecordType::A,
            RecordData::Aaaa { .. } => RecordType::AAAA,
            RecordData::Cname { .. } => RecordType::CNAME,
            RecordData::Ns { .. } => RecordType::NS,
            RecordData::Ptr { .. } => RecordType::PTR,
            RecordData::Mx { .. } => RecordType::MX,
            RecordData::Dname { .. } => RecordType::DNAME,
            RecordData::Txt { .. } => RecordType::TXT,
            RecordData::Srv { .. } => RecordType::SRV,
            RecordData::Caa { .. } => RecordType::CAA,
            RecordData::Tlsa { .. } => RecordType::TLSA,
            RecordData::Sshfp { .. } => RecordType::SSHFP,
            RecordData::Naptr { .. } => RecordType::NAPTR,
            RecordData::Svcb { .. } => RecordType::SVCB,
            RecordData::Loc(_) => RecordType::LOC,
            RecordData::Rp { .. } => RecordType::RP,
        }
    }

    /// Render the right-hand side of the record line
    pub fn to_rdata(&self) -> String {
        match self {
            RecordData::A { address } | RecordData::Aaaa { address } => address.trim().to_string(),
            RecordData::Cname { target }
            | RecordData::Ns { target }
            | RecordData::Ptr { target }
            | RecordData::Dname { target } => target.trim().to_string(),
            RecordData::Mx {
                preference,
                exchange,
            } => format!("{} {}", preference, exchange.trim()),
            RecordData::Txt { text } => quote_txt(text),
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => format!("{} {} {} {}", priority, weight, port, target.trim()),
            RecordData::Caa { flags, tag, value } => {
                format!("{} {} {}", flags, tag.trim(), character_string(value))
            }
            RecordData::Tlsa {
                usage,
                selector,
                matching_type,
                certificate,
            } => format!(
                "{} {} {} {}",
                usage,
                selector,
                matching_type,
                certificate.trim()
            ),
            RecordData::Sshfp {
                algorithm,
                fp_type,
                fingerprint,
            } => format!("{} {} {}", algorithm, fp_type, fingerprint.trim()),
            RecordData::Naptr {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => format!(
                "{} {} {} {} {} {}",
                order,
                preference,
                character_string(flags),
                character_string(service),
                character_string(regexp),
                replacement.trim()
            ),
            RecordData::Svcb {
                priority,
                target,
                params,
            } => {
                let params = params.trim();
                if params.is_empty() {
                    format!("{} {}", priority, target.trim())
                } else {
                    format!("{} {} {}", priority, target.trim(), params)
                }
            }
            RecordData::Loc(loc) => loc.to_string(),
            RecordData::Rp { mbox, txt } => format!("{} {}", mbox.trim(), txt.trim()),
        }
    }
}

impl fmt::Display for LocData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}m {}m {}m {}m",
            self.lat_degrees,
            self.lat_minutes,
            self.lat_seconds,
            self.lat_hemisphere.to_ascii_uppercase(),
            self.lon_degrees,
            self.lon_minutes,
            self.lon_seconds,
            self.lon_hemisphere.to_ascii_uppercase(),
            self.altitude,
            self.size,
            self.horiz_precision,
            self.vert_precision
        )
    }
}

/// A single resource-record row belonging to a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Owner name as stored; `@` or empty stands for the zone apex
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(flatten)]
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, data: RecordData) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            data,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    /// Owner as it should appear in the zone file
    pub fn owner(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() { "@" } else { name }
    }

    /// Render the full zone-file line (without trailing newline)
    pub fn to_zone_line(&self) -> String {
        let ttl = self.ttl.map(|t| format!("{} ", t)).unwrap_or_default();
        format!(
            "{:<23} {}IN {:<6} {}",
            self.owner(),
            ttl,
            self.record_type(),
            self.data.to_rdata()
        )
    }
}

/// Quote TXT data, splitting it into 255-byte character-strings.
///
/// Text that already starts with a quote is treated as pre-formatted.
fn quote_txt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('"') {
        return trimmed.to_string();
    }

    // The 255-byte limit applies to the wire data, so split before escaping
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in trimmed.chars() {
        if current.len() + ch.len_utf8() > MAX_CHARACTER_STRING {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    chunks.push(current);

    chunks
        .iter()
        .map(|chunk| format!("\"{}\"", escape_character_string(chunk)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn character_string(value: &str) -> String {
    format!("\"{}\"", escape_character_string(value.trim().trim_matches('"')))
}

fn escape_character_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
