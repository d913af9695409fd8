// mysql-resync/src/utils/disk.rs
//! Free-space probes over `df -P` (POSIX output format).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub filesystem: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
    pub capacity_percent: u8,
    pub mounted_on: String,
}

/// Arguments for `df` reporting on `path` in 1024-byte blocks.
pub fn df_args(path: &str) -> Vec<String> {
    vec!["-P".to_string(), "-k".to_string(), path.to_string()]
}

/// Parses the output of `df -P -k <path>`.
///
/// The header is checked so that a locale or implementation printing a
/// different column order is rejected instead of misread.
pub fn parse_df_output(output: &str) -> Option<DiskUsage> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next()?.split_whitespace().collect();
    if header.len() < 6
        || !header[0].eq_ignore_ascii_case("Filesystem")
        || !header[4].eq_ignore_ascii_case("Capacity")
    {
        return None;
    }

    let row = lines.last()?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }

    Some(DiskUsage {
        filesystem: fields[0].to_string(),
        total_kb: fields[1].parse().ok()?,
        used_kb: fields[2].parse().ok()?,
        available_kb: fields[3].parse().ok()?,
        capacity_percent: fields[4].trim_end_matches('%').parse().ok()?,
        mounted_on: fields[5..].join(" "),
    })
}

fn human(kb: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    let mut value = kb as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

impl fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} available of {} ({}% used) on {} [{}]",
            human(self.available_kb),
            human(self.total_kb),
            self.capacity_percent,
            self.mounted_on,
            self.filesystem
        )
    }
}
