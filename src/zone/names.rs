//! Name and path normalization shared by the synthesizer and the publisher.

use std::path::PathBuf;

use crate::error::{Result, ZoneError};
use crate::model::ZoneNode;

/// Ensure a host name ends with exactly one trailing dot.
///
/// Surrounding whitespace is dropped; an empty input stays empty.
pub fn normalize_fqdn(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{}.", trimmed)
}

/// Zone domain without whitespace or trailing dots
pub fn bare_domain(domain: &str) -> String {
    let collapsed: String = domain.chars().filter(|c| !c.is_whitespace()).collect();
    collapsed.trim_end_matches('.').to_string()
}

/// `$ORIGIN` value for a zone domain, e.g. `example.com.`
pub fn normalize_origin(domain: &str) -> String {
    normalize_fqdn(&bare_domain(domain))
}

/// Turn a responsible-person mailbox into the SOA RNAME domain-name form.
///
/// `admin@example.com` becomes `admin.example.com.`, a bare local part is
/// completed with the zone domain, and an empty value falls back to
/// `hostmaster`.
pub fn format_soa_rname(rname: &str, zone_domain: &str) -> String {
    let domain = bare_domain(zone_domain);
    let rname = rname.trim();

    if rname.is_empty() {
        return if domain.is_empty() {
            "hostmaster.".to_string()
        } else {
            format!("hostmaster.{}.", domain)
        };
    }

    let mailbox = rname.replace('@', ".");
    let bare = mailbox.trim_end_matches('.');

    if !bare.contains('.') && !domain.is_empty() {
        format!("{}.{}.", bare, domain)
    } else {
        format!("{}.", bare)
    }
}

/// Primary name server for the SOA record, defaulting to `ns1.<domain>.`
pub fn normalize_mname(mname: &str, zone_domain: &str) -> String {
    let mname = mname.trim();
    if mname.is_empty() {
        let domain = bare_domain(zone_domain);
        return if domain.is_empty() {
            "ns1.localhost.".to_string()
        } else {
            format!("ns1.{}.", domain)
        };
    }
    normalize_fqdn(mname)
}

/// Check a zone's configured directory and return it as path segments
fn directory_segments(directory: &str) -> Result<Vec<&str>> {
    if directory.contains('\\') {
        return Err(ZoneError::InvalidPath(format!(
            "directory must not contain backslashes: {}",
            directory
        )));
    }
    if directory.starts_with('/') {
        return Err(ZoneError::InvalidPath(format!(
            "directory must be relative: {}",
            directory
        )));
    }

    let mut segments = Vec::new();
    for segment in directory.split('/') {
        match segment.trim() {
            "" | "." => continue,
            ".." => {
                return Err(ZoneError::InvalidPath(format!(
                    "directory must not contain '..': {}",
                    directory
                )));
            }
            _ => segments.push(segment),
        }
    }
    Ok(segments)
}

fn checked_filename(node: &ZoneNode) -> Result<&str> {
    let filename = node.filename.trim();
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(ZoneError::InvalidPath(format!(
            "invalid filename for zone {}: {:?}",
            node.id, node.filename
        )));
    }
    Ok(filename)
}

/// `<directory>/<filename>` relative to the publish base
pub fn relative_path(node: &ZoneNode) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for segment in directory_segments(&node.directory)? {
        path.push(segment);
    }
    path.push(checked_filename(node)?);
    Ok(path)
}

/// Path used in `$INCLUDE` directives, always with forward slashes
pub fn include_path(node: &ZoneNode) -> Result<String> {
    let mut segments = directory_segments(&node.directory)?;
    segments.push(checked_filename(node)?);
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fqdn() {
        assert_eq!(normalize_fqdn("ns1.example.com"), "ns1.example.com.");
        assert_eq!(normalize_fqdn("ns1.example.com."), "ns1.example.com.");
        assert_eq!(normalize_fqdn("  ns1.example.com  "), "ns1.example.com.");
        assert_eq!(normalize_fqdn("ns1.example.com.."), "ns1.example.com.");
        assert_eq!(normalize_fqdn(""), "");

        let once = normalize_fqdn("ns1.example.com");
        assert_eq!(normalize_fqdn(&once), once);
    }

    #[test]
    fn test_format_soa_rname() {
        assert_eq!(format_soa_rname("admin@example.com", ""), "admin.example.com.");
        assert_eq!(
            format_soa_rname("hostmaster", "example.com"),
            "hostmaster.example.com."
        );
        assert_eq!(format_soa_rname("", "example.com"), "hostmaster.example.com.");
        assert_eq!(format_soa_rname("", ""), "hostmaster.");
        assert_eq!(
            format_soa_rname("hostmaster.example.com", ""),
            "hostmaster.example.com."
        );
        assert_eq!(
            format_soa_rname("admin.example.com.", ""),
            "admin.example.com."
        );
        assert_eq!(format_soa_rname("admin", "example.com."), "admin.example.com.");
        assert_eq!(format_soa_rname("hostmaster", ""), "hostmaster.");
    }

    #[test]
    fn test_normalize_mname() {
        assert_eq!(normalize_mname("", "example.com"), "ns1.example.com.");
        assert_eq!(normalize_mname("  ", ""), "ns1.localhost.");
        assert_eq!(normalize_mname("ns2.example.net", "example.com"), "ns2.example.net.");
    }

    #[test]
    fn test_origin_collapses_whitespace() {
        assert_eq!(normalize_origin(" example.com "), "example.com.");
        assert_eq!(normalize_origin("exa mple.com.."), "example.com.");
        assert_eq!(normalize_origin("   "), "");
    }

    #[test]
    fn test_relative_paths() {
        let node = ZoneNode::include(3, "common").with_directory("zones/shared/");
        assert_eq!(relative_path(&node).unwrap(), PathBuf::from("zones/shared/common.inc"));
        assert_eq!(include_path(&node).unwrap(), "zones/shared/common.inc");

        let flat = ZoneNode::include(4, "flat");
        assert_eq!(include_path(&flat).unwrap(), "flat.inc");
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dotdot = ZoneNode::include(1, "x").with_directory("zones/../etc");
        assert!(matches!(relative_path(&dotdot), Err(ZoneError::InvalidPath(_))));

        let backslash = ZoneNode::include(2, "x").with_directory("zones\\win");
        assert!(matches!(relative_path(&backslash), Err(ZoneError::InvalidPath(_))));

        let absolute = ZoneNode::include(3, "x").with_directory("/etc");
        assert!(relative_path(&absolute).is_err());

        let bad_name = ZoneNode::include(4, "x").with_filename("../passwd");
        assert!(include_path(&bad_name).is_err());
    }
}
