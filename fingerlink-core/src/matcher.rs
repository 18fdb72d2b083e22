//! Fingerprint template similarity
//!
//! Scores two 512-byte templates on a 0..=100 scale using zone-weighted
//! correlation. The matcher only scores; the decision threshold is applied
//! by the caller.

use fingerlink_types::{MatchResult, StoredTemplate, Template};
use tracing::trace;

/// Similarity cutoff used when none is configured
pub const DEFAULT_THRESHOLD: u8 = 65;

/// Byte range of a template scored as one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub name: &'static str,

    /// First byte offset (inclusive)
    pub start: usize,

    /// Last byte offset (inclusive)
    pub end: usize,

    pub weight: f64,
}

/// Template zones
///
/// Offsets 200 and 350 each belong to two adjacent zones. Existing scores
/// depend on this layout, so it is kept as-is.
pub const ZONES: [Zone; 4] = [
    Zone { name: "header", start: 0, end: 8, weight: 0.5 },
    Zone { name: "primary", start: 9, end: 200, weight: 3.0 },
    Zone { name: "secondary", start: 200, end: 350, weight: 2.0 },
    Zone { name: "tail", start: 350, end: 511, weight: 1.0 },
];

/// Absorbs rounding noise before flooring (identical inputs must score 100)
const FLOOR_EPSILON: f64 = 1e-9;

/// Score two templates given in hexadecimal wire form
///
/// # Algorithm
///
/// ```text
/// 1. Reject inputs that are not exactly 1024 hex characters (score 0)
/// 2. For every zone: r = Pearson correlation of the two byte ranges
///    (zone score 0 if either range is constant, else (r + 1) / 2)
/// 3. score = floor(100 * Σ(zone_score * weight) / Σ(weight))
/// ```
///
/// Malformed input never errors; it simply scores as "no similarity".
///
/// # Examples
///
/// ```
/// use fingerlink_core::matcher;
///
/// let hex: String = (0..512u32).map(|i| format!("{:02x}", (i * 37 + 11) % 256)).collect();
/// assert_eq!(matcher::compare(&hex, &hex), 100);
/// assert_eq!(matcher::compare(&hex, "abcd"), 0);
/// ```
pub fn compare(a: &str, b: &str) -> u8 {
    if a.len() != Template::HEX_LEN || b.len() != Template::HEX_LEN {
        return 0;
    }

    match (Template::from_hex(a), Template::from_hex(b)) {
        (Ok(a), Ok(b)) => compare_templates(&a, &b),
        _ => 0,
    }
}

/// Score two decoded templates
pub fn compare_templates(a: &Template, b: &Template) -> u8 {
    let a = a.as_bytes();
    let b = b.as_bytes();

    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for zone in &ZONES {
        let range = zone.start..=zone.end;
        let zone_score = correlation(&a[range.clone()], &b[range])
            .map(|r| (r + 1.0) / 2.0)
            .unwrap_or(0.0);

        trace!(zone = zone.name, zone_score, "Scored zone");

        weighted += zone_score * zone.weight;
        total_weight += zone.weight;
    }

    let score = (100.0 * weighted / total_weight + FLOOR_EPSILON).floor();

    score.clamp(0.0, 100.0) as u8
}

/// Pearson correlation of two equally long byte sequences
///
/// Returns `None` when either sequence has zero variance.
fn correlation(x: &[u8], y: &[u8]) -> Option<f64> {
    debug_assert_eq!(x.len(), y.len());

    let n = x.len() as f64;
    let mean_x = x.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let mean_y = y.iter().map(|&v| f64::from(v)).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;

    for (&xi, &yi) in x.iter().zip(y) {
        let dx = f64::from(xi) - mean_x;
        let dy = f64::from(yi) - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }

    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Find the best stored template scoring at or above `threshold`
///
/// Ties keep the earliest candidate. Stored entries with malformed hex
/// score 0 and are skipped unless the threshold is 0.
pub fn best_match(candidate: &str, stored: &[StoredTemplate], threshold: u8) -> MatchResult {
    let mut best: Option<(u32, u8)> = None;

    for entry in stored {
        let score = compare(candidate, &entry.hex);
        trace!(id = entry.id, score, "Compared stored template");

        if score < threshold {
            continue;
        }

        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((entry.id, score));
        }
    }

    match best {
        Some((id, score)) => MatchResult::found(id, score),
        None => MatchResult::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pattern() -> Vec<u8> {
        (0..Template::SIZE).map(|i| ((i * 37 + 11) % 256) as u8).collect()
    }

    fn invert(bytes: &mut [u8], range: std::ops::RangeInclusive<usize>) {
        for b in &mut bytes[range] {
            *b = 255 - *b;
        }
    }

    #[test]
    fn test_identical_templates_score_100() {
        let hex = hex::encode(pattern());
        assert_eq!(compare(&hex, &hex), 100);
        assert_eq!(compare(&hex.to_uppercase(), &hex), 100);
    }

    #[test]
    fn test_invalid_length_scores_zero() {
        let hex = hex::encode(pattern());

        assert_eq!(compare(&hex[..1022], &hex), 0);
        assert_eq!(compare(&hex, &format!("{}00", hex)), 0);
        assert_eq!(compare("", ""), 0);
    }

    #[test]
    fn test_non_hex_scores_zero() {
        let hex = hex::encode(pattern());
        let mut bad = hex.clone();
        bad.replace_range(10..12, "zz");

        assert_eq!(compare(&hex, &bad), 0);
        assert_eq!(compare(&format!(" {}", &hex[1..]), &hex), 0);
    }

    #[test]
    fn test_constant_template_scores_zero() {
        let flat = "00".repeat(Template::SIZE);
        let hex = hex::encode(pattern());

        assert_eq!(compare(&flat, &hex), 0);
        assert_eq!(compare(&flat, &flat), 0);
    }

    #[test]
    fn test_inverted_template_scores_zero() {
        let a = pattern();
        let mut b = a.clone();
        invert(&mut b, 0..=511);

        assert_eq!(compare(&hex::encode(&a), &hex::encode(&b)), 0);
    }

    #[test]
    fn test_zone_weights() {
        let a = pattern();

        // Header anti-correlated, everything else identical: 6.0 / 6.5
        let mut b = a.clone();
        invert(&mut b, 0..=8);
        assert_eq!(compare(&hex::encode(&a), &hex::encode(&b)), 92);

        // Primary inverted except the shared byte 200, which keeps the
        // secondary zone identical
        let mut c = a.clone();
        invert(&mut c, 9..=199);
        assert_eq!(compare(&hex::encode(&a), &hex::encode(&c)), 54);

        // Inverting byte 200 as well disturbs both adjacent zones
        invert(&mut c, 200..=200);
        assert_eq!(compare(&hex::encode(&a), &hex::encode(&c)), 53);
    }

    #[test]
    fn test_zones_overlap_at_shared_offsets() {
        assert_eq!(ZONES[1].end, ZONES[2].start);
        assert_eq!(ZONES[2].end, ZONES[3].start);
        assert_eq!(ZONES[3].end, Template::SIZE - 1);
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let a = pattern();
        let mut weak = a.clone();
        invert(&mut weak, 9..=199);

        let candidate = hex::encode(&a);
        let stored = vec![
            StoredTemplate::new(1, hex::encode(&weak)),
            StoredTemplate::new(2, "garbage"),
            StoredTemplate::new(3, hex::encode(&a)),
        ];

        assert_eq!(best_match(&candidate, &stored, 65), MatchResult::found(3, 100));
        assert_eq!(best_match(&candidate, &stored[..2], 65), MatchResult::not_found());
        assert_eq!(best_match(&candidate, &stored[..1], 50), MatchResult::found(1, 54));
    }

    #[test]
    fn test_best_match_tie_keeps_first() {
        let hex = hex::encode(pattern());
        let stored = vec![StoredTemplate::new(4, hex.clone()), StoredTemplate::new(9, hex.clone())];

        assert_eq!(best_match(&hex, &stored, DEFAULT_THRESHOLD).template_id, Some(4));
    }

    proptest! {
        #[test]
        fn prop_compare_is_symmetric(
            a in proptest::collection::vec(any::<u8>(), Template::SIZE),
            b in proptest::collection::vec(any::<u8>(), Template::SIZE),
        ) {
            let (a, b) = (hex::encode(a), hex::encode(b));
            prop_assert_eq!(compare(&a, &b), compare(&b, &a));
        }

        #[test]
        fn prop_identical_templates_score_100(
            mut bytes in proptest::collection::vec(any::<u8>(), Template::SIZE),
        ) {
            // Two distinct values at the start of every zone rule out zero variance
            for zone in ZONES {
                bytes[zone.start] = 0x00;
                bytes[zone.start + 1] = 0xFF;
            }
            let hex = hex::encode(&bytes);
            prop_assert_eq!(compare(&hex, &hex), 100);
        }

        #[test]
        fn prop_score_in_range(
            a in proptest::collection::vec(any::<u8>(), Template::SIZE),
            b in proptest::collection::vec(any::<u8>(), Template::SIZE),
        ) {
            prop_assert!(compare(&hex::encode(a), &hex::encode(b)) <= 100);
        }

        #[test]
        fn prop_wrong_length_scores_zero(
            a in proptest::collection::vec(any::<u8>(), 0..600usize),
        ) {
            prop_assume!(a.len() != Template::SIZE);
            let valid = hex::encode(pattern());
            prop_assert_eq!(compare(&hex::encode(a), &valid), 0);
        }
    }
}
