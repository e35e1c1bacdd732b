use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Parse a ports file into a deduplicated list of TCP ports (1..=65535), in file order.
///
/// Supported formats per line:
/// - single port number: `5000`
/// - inclusive range: `8080-8082`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        // Strip comments and trim
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        // Range `start-end`
        if let Some((a, b)) = line.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
            if start > end {
                bail!("line {line_no}: invalid range {start}-{end} (start > end)");
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        // Single number
        let p = parse_port_str(line)
            .with_context(|| format!("line {line_no}: invalid port value: {line}"))?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Load a fallback port list from a file. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

/// Ports probed when no runtime process could be enumerated: the usual dev
/// server ports, then two coarse bands over 50000-70000 (1000 apart).
/// Band entries past 65535 are dropped.
pub fn fallback_ports() -> Vec<u16> {
    const CONVENTIONAL: &[u16] = &[3000, 3001, 3002, 5000, 5001, 5002, 8080, 8081, 8082];
    let bands = (0..10u32)
        .map(|i| 50_000 + i * 1_000)
        .chain((0..10u32).map(|i| 60_000 + i * 1_000));

    let mut out = CONVENTIONAL.to_vec();
    out.extend(bands.filter_map(|p| u16::try_from(p).ok()));
    out
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
