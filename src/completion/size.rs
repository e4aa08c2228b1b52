//! Human readable byte sizes.

const BINARY_UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
const SI_UNITS: &[&str] = &["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Formats `bytes` with `dp` decimals, in 1024-based units or, with `si`,
/// 1000-based ones.
///
/// ```
/// use logql_lens::completion::human_file_size;
///
/// assert_eq!(human_file_size(0, false, 1), "0 B");
/// assert_eq!(human_file_size(1536, false, 1), "1.5 KiB");
/// assert_eq!(human_file_size(1500, true, 1), "1.5 kB");
/// ```
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn human_file_size(bytes: u64, si: bool, dp: usize) -> String {
    let (thresh, units) = if si {
        (1000.0, SI_UNITS)
    } else {
        (1024.0, BINARY_UNITS)
    };

    let mut value = bytes as f64;
    if value < thresh {
        return format!("{bytes} B");
    }

    let scale = 10f64.powi(dp as i32);
    let mut unit = 0;
    value /= thresh;
    while (value * scale).round() / scale >= thresh && unit < units.len() - 1 {
        value /= thresh;
        unit += 1;
    }

    format!("{value:.dp$} {}", units[unit])
}
