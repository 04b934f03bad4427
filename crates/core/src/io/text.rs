//! Delimited text reading/writing of flow vectors
//!
//! One vector per line: `id, origin_x, origin_y, dest_x, dest_y`.
//! Fields are separated by commas and/or whitespace. Blank lines and lines
//! starting with `#` are skipped. A first data line whose leading field is
//! not a number is treated as a header.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::vector::{FlowVector, VectorSample};

/// Read a vector file into a sample
pub fn read_vectors<P: AsRef<Path>>(path: P) -> Result<VectorSample> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_vectors(&text)
}

/// Parse vector text into a sample
pub fn parse_vectors(text: &str) -> Result<VectorSample> {
    let mut rows = Vec::new();
    let mut seen_data = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        if !seen_data && fields.first().is_some_and(|f| f.parse::<f64>().is_err()) {
            seen_data = true;
            continue;
        }
        seen_data = true;

        if fields.len() != 5 {
            return Err(Error::Parse {
                line: line_no,
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let id: u64 = fields[0].parse().map_err(|_| Error::Parse {
            line: line_no,
            reason: format!("invalid id '{}'", fields[0]),
        })?;
        let mut coords = [0.0_f64; 4];
        for (slot, field) in coords.iter_mut().zip(&fields[1..]) {
            *slot = field.parse().map_err(|_| Error::Parse {
                line: line_no,
                reason: format!("invalid coordinate '{}'", field),
            })?;
        }
        rows.push((id, coords[0], coords[1], coords[2], coords[3]));
    }

    VectorSample::from_tuples(&rows)
}

/// Write a sample as comma-separated text with a header line
pub fn write_vectors<P: AsRef<Path>>(sample: &VectorSample, path: P) -> Result<()> {
    let mut file = fs::File::create(path.as_ref())?;
    writeln!(file, "id,origin_x,origin_y,dest_x,dest_y")?;
    for FlowVector { id, origin, destination } in sample {
        writeln!(
            file,
            "{},{},{},{},{}",
            id, origin.x, origin.y, destination.x, destination.y
        )?;
    }
    Ok(())
}
