use std::cmp::Ordering;

/// Numeric segments of a version string. `v1.2.3-beta` becomes `[1, 2, 3]`.
/// A segment without leading digits counts as 0.
pub fn version_segments(raw: &str) -> Vec<u64> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let core = trimmed.split('-').next().unwrap_or_default();
    core.split('.').map(leading_number).collect()
}

fn leading_number(segment: &str) -> u64 {
    let digits = segment
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().unwrap_or(0)
}

pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = version_segments(left);
    let right = version_segments(right);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let a = left.get(idx).copied().unwrap_or(0);
        let b = right.get(idx).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
