//! Output file names for saved sessions
//!
//! Names look like `processed_<ops>_<YYYYmmddHHMMSS>_<base>`. When the result
//! would exceed the length bound, the operation summary is shortened and
//! tagged with `~` and an FNV-1a hash of the full summary, so distinct
//! histories keep distinct names.

use chrono::{DateTime, Local};
use tracing::warn;

const PREFIX: &str = "processed_";
/// Longest base name kept from the source file
const MAX_BASE_LEN: usize = 64;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Keep `[A-Za-z0-9_-]`; decimal points become `p`, everything else `_`
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            '.' => 'p',
            _ => '_',
        })
        .collect()
}

/// 32-bit FNV-1a
fn fnv1a(text: &str) -> u32 {
    text.bytes().fold(0x811c_9dc5u32, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(0x0100_0193)
    })
}

/// Build a file stem (no extension) from the compact operation summaries
///
/// The stem never exceeds `max_len`. The operation summary is shortened
/// first; if the bound cannot fit prefix, hash tag, timestamp and base name,
/// the base name is dropped, and as a last resort the stem is cut.
pub fn output_name(ops: &[String], timestamp: DateTime<Local>, base: &str, max_len: usize) -> String {
    let summary = if ops.is_empty() {
        "no_ops".to_string()
    } else {
        sanitize(&ops.join("_"))
    };

    let base = sanitize(base);
    let base = base.strip_prefix(PREFIX).unwrap_or(&base);
    let base: String = base.chars().take(MAX_BASE_LEN).collect();
    let stamp = timestamp.format(TIMESTAMP_FORMAT).to_string();

    let name = stem(&summary, &format!("_{stamp}_{base}"), max_len);
    if name.len() <= max_len {
        return name;
    }
    warn!(max_len, "name bound too small, dropping the base name");
    let mut name = stem(&summary, &format!("_{stamp}"), max_len);
    // Sanitized text is ASCII, so byte truncation is safe
    name.truncate(max_len);
    name
}

/// `processed_<summary><suffix>`, with the summary shortened to fit `max_len`
fn stem(summary: &str, suffix: &str, max_len: usize) -> String {
    let budget = max_len.saturating_sub(PREFIX.len() + suffix.len());
    if summary.len() <= budget {
        return format!("{PREFIX}{summary}{suffix}");
    }
    let tag = format!("~{:08x}", fnv1a(summary));
    let keep = budget.saturating_sub(tag.len()).min(summary.len());
    format!("{PREFIX}{}{tag}{suffix}", &summary[..keep])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().unwrap()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("p1.5"), "p1p5");
        assert_eq!(sanitize("my song (live)!"), "my_song__live__");
        assert_eq!(sanitize("a-b_c"), "a-b_c");
    }

    #[test]
    fn test_basic_name() {
        let ops = vec!["p2".to_string(), "loop2_8_4".to_string()];
        assert_eq!(
            output_name(&ops, stamp(), "track one", 200),
            "processed_p2_loop2_8_4_20240309140507_track_one"
        );
        assert_eq!(
            output_name(&[], stamp(), "t", 200),
            "processed_no_ops_20240309140507_t"
        );
    }

    #[test]
    fn test_strips_repeated_prefix() {
        let name = output_name(&["t1p5".to_string()], stamp(), "processed_old", 200);
        assert_eq!(name, "processed_t1p5_20240309140507_old");
    }

    #[test]
    fn test_truncation_is_bounded_and_distinct() {
        let long_a: Vec<String> = (0..60).map(|i| format!("p{i}")).collect();
        let mut long_b = long_a.clone();
        long_b[59] = "p99".to_string();

        let a = output_name(&long_a, stamp(), "song", 80);
        let b = output_name(&long_b, stamp(), "song", 80);
        assert_eq!(a.len(), 80);
        assert_eq!(b.len(), 80);
        assert_ne!(a, b);
        assert!(a.ends_with("_20240309140507_song"));
        assert!(a.contains('~'));
    }

    #[test]
    fn test_tiny_bound_is_respected() {
        let ops: Vec<String> = (0..10).map(|i| format!("loop{i}_8_4")).collect();
        for max_len in 0..=80 {
            let name = output_name(&ops, stamp(), "song", max_len);
            assert!(name.len() <= max_len, "{max_len}: {name}");
        }
        // Room for prefix, tag and timestamp but not the base name
        let name = output_name(&ops, stamp(), "song", 34);
        assert!(name.starts_with("processed_~"));
        assert!(name.ends_with("_20240309140507"));
    }

    #[test]
    fn test_base_is_capped() {
        let base = "x".repeat(200);
        let name = output_name(&["p1".to_string()], stamp(), &base, 500);
        assert!(name.ends_with(&"x".repeat(MAX_BASE_LEN)));
        assert!(!name.ends_with(&"x".repeat(MAX_BASE_LEN + 1)));
    }
}
