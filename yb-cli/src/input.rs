//! Raw input acquisition: the whole stream is read into memory before decoding.
//!
//! Bytes are passed through untouched (no text decoding, no line-ending
//! translation).

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Read the entire input from `file`, or stdin when absent or `-`.
pub fn read_input(file: Option<&Path>) -> Result<Vec<u8>> {
    let buf = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        _ => read_all(std::io::stdin().lock()).context("cannot read standard input")?,
    };
    info!(
        source = %file.map(|p| p.display().to_string()).unwrap_or_else(|| "-".into()),
        bytes = buf.len(),
        "input loaded"
    );
    Ok(buf)
}

/// Drain a reader into a buffer.
pub fn read_all<R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read course waypoints, one `lat lon` (or `lat,lon`) pair per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn read_course(path: &Path) -> Result<Vec<(f64, f64)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read course {}", path.display()))?;
    parse_course(&text).with_context(|| format!("invalid course {}", path.display()))
}

fn parse_course(text: &str) -> Result<Vec<(f64, f64)>> {
    let mut points = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let &[lat, lon] = fields.as_slice() else {
            bail!("line {}: expected `lat lon`, got {line:?}", n + 1);
        };
        let lat: f64 = lat
            .parse()
            .with_context(|| format!("line {}: bad latitude {lat:?}", n + 1))?;
        let lon: f64 = lon
            .parse()
            .with_context(|| format!("line {}: bad longitude {lon:?}", n + 1))?;
        points.push((lat, lon));
    }
    info!(waypoints = points.len(), "course loaded");
    Ok(points)
}
