use anyhow::{bail, Context, Result};
use std::collections::HashSet;

/// Parse a scanner port specification into a deduplicated list of TCP ports (1..=65535).
///
/// Supported forms, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - whitespace around items is ignored
pub fn parse_port_spec(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_item) in s.split(',').enumerate() {
        let item_no = idx + 1;
        let item = raw_item.trim();
        if item.is_empty() {
            bail!("item {item_no}: empty port entry");
        }

        // Range `start-end`
        if let Some((a, b)) = item.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("item {item_no}: invalid start in range: {a}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("item {item_no}: invalid end in range: {b}"))?;
            if start > end {
                bail!("item {item_no}: invalid range {start}-{end} (start > end)");
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(item)
            .with_context(|| format!("item {item_no}: invalid port value: {item}"))?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Validate a port specification and return it in the compact form handed to the scanner.
pub fn normalize_port_spec(s: &str) -> Result<String> {
    parse_port_spec(s)?;
    Ok(s.split(',')
        .map(|item| item.split('-').map(str::trim).collect::<Vec<_>>().join("-"))
        .collect::<Vec<_>>()
        .join(","))
}

/// Validate a probe target (IP address or hostname) before it reaches a command line.
///
/// Rejects anything an external tool could read as an option.
pub fn validate_target(target: &str) -> Result<&str> {
    let t = target.trim();
    if t.is_empty() {
        bail!("target is empty");
    }
    if t.len() > 253 {
        bail!("target is too long");
    }
    if t.starts_with('-') {
        bail!("target must not start with '-': {t}");
    }
    if let Some(c) = t
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_' | '%')))
    {
        bail!("target contains illegal character {c:?}: {t}");
    }
    Ok(t)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
