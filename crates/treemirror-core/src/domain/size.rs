//! Human-readable byte sizes for console notices

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Formats a byte count as `MB`, `KB` or `B`.
///
/// The largest unit whose two-decimal rendering is non-zero wins, so
/// `1536` renders as `1.50 KB` and `3` renders as `3 B`.
pub fn format_size(bytes: u64) -> String {
    let mb = format!("{:.2}", bytes as f64 / MIB);
    if mb != "0.00" {
        return format!("{mb} MB");
    }

    let kb = format!("{:.2}", bytes as f64 / KIB);
    if kb != "0.00" {
        return format!("{kb} KB");
    }

    format!("{bytes} B")
}
