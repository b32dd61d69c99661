//! Human-readable size formatting for transfer logs.

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Format bytes with binary-prefix units, three decimals, trailing zeros trimmed.
///
/// ```
/// use nightly_backup::utils::format::format_size;
/// assert_eq!(format_size(1024), "1KB");
/// assert_eq!(format_size(1500), "1.465KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut unit_index = 0;
    let mut scaled = bytes;
    while scaled >= 1024 && unit_index < UNITS.len() - 1 {
        scaled /= 1024;
        unit_index += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit_index as i32);
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');

    format!("{}{}", trimmed, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_exact_units() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(10), "10B");
        assert_eq!(format_size(1024), "1KB");
        assert_eq!(format_size(1024 * 1024), "1MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1GB");
        assert_eq!(format_size(1024u64.pow(4)), "1TB");
    }

    #[test]
    fn test_format_size_fractional() {
        assert_eq!(format_size(1500), "1.465KB");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(1023), "1023B");
    }

    #[test]
    fn test_format_size_stays_in_terabytes() {
        assert_eq!(format_size(2048 * 1024u64.pow(4)), "2048TB");
    }
}
