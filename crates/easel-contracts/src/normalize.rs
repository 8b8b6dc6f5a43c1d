//! Canonical aspect-ratio and size tokens.
//!
//! Every component exchanges ratios as a reduced `W:H` string and sizes as
//! either a tier (`1K`..`8K`) or a pixel dimension (`WxH`). An empty string
//! always means "no opinion"; callers must not read it as `1:1`.

use std::sync::LazyLock;

use regex::Regex;

const MAX_RATIO_DECIMALS: u32 = 4;
const RATIO_EPSILON: f64 = 1e-9;

static TIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-8])\s*k$").expect("valid size tier regex"));

static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2,5})\s*[x*×]\s*(\d{2,5})$").expect("valid dimension regex")
});

static BARE_RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3,5}$").expect("valid bare resolution regex"));

static PROGRESSIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3,4})p$").expect("valid progressive resolution regex"));

/// Normalizes `16:9`, `1920x1080`, `3/2`, `1.5:1` or the aliases
/// `square`/`landscape`/`portrait` into a reduced `W:H` ratio.
pub fn normalize_aspect_ratio(token: &str) -> String {
    let lowered = token.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "square" => return "1:1".to_string(),
        "landscape" => return "16:9".to_string(),
        "portrait" => return "9:16".to_string(),
        _ => {}
    }
    let Some((left, right)) = lowered.split_once([':', 'x', '/']) else {
        return String::new();
    };
    let (Some((left_value, left_decimals)), Some((right_value, right_decimals))) =
        (parse_decimal(left.trim()), parse_decimal(right.trim()))
    else {
        return String::new();
    };
    let scale = 10f64.powi(left_decimals.max(right_decimals) as i32);
    let width = (left_value * scale).round();
    let height = (right_value * scale).round();
    if width < 1.0 || height < 1.0 || width > u64::MAX as f64 || height > u64::MAX as f64 {
        return String::new();
    }
    let (width, height) = (width as u64, height as u64);
    let divisor = gcd(width, height);
    format!("{}:{}", width / divisor, height / divisor)
}

/// Normalizes a size token into a tier (`2K`) or a dimension (`1024x768`).
///
/// Bare numbers are read as squares and `720p`-style tokens as 16:9 frames.
pub fn normalize_size_token(token: &str) -> String {
    let lowered = token.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return String::new();
    }
    if let Some(captures) = TIER_RE.captures(&lowered) {
        return format!("{}K", &captures[1]);
    }
    if let Some(captures) = DIMENSION_RE.captures(&lowered) {
        let width = captures[1].parse::<u32>().unwrap_or(0);
        let height = captures[2].parse::<u32>().unwrap_or(0);
        if width == 0 || height == 0 {
            return String::new();
        }
        return format!("{width}x{height}");
    }
    if BARE_RESOLUTION_RE.is_match(&lowered) {
        return match lowered.parse::<u32>() {
            Ok(side) if side > 0 => format!("{side}x{side}"),
            _ => String::new(),
        };
    }
    if let Some(captures) = PROGRESSIVE_RE.captures(&lowered) {
        let height = captures[1].parse::<u32>().unwrap_or(0);
        if height == 0 {
            return String::new();
        }
        let width = (f64::from(height) * 16.0 / 9.0).round() as u32;
        return format!("{width}x{height}");
    }
    String::new()
}

/// Parses any size token that normalizes to a pixel dimension.
pub fn parse_dimensions(token: &str) -> Option<(u32, u32)> {
    let normalized = normalize_size_token(token);
    let (width, height) = normalized.split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

pub fn is_size_tier(token: &str) -> bool {
    normalize_size_token(token).ends_with('K')
}

/// Width divided by height for any parseable ratio token.
pub fn ratio_value(token: &str) -> Option<f64> {
    let normalized = normalize_aspect_ratio(token);
    let (width, height) = normalized.split_once(':')?;
    let width = width.parse::<f64>().ok()?;
    let height = height.parse::<f64>().ok()?;
    Some(width / height)
}

pub fn ratio_for_dimensions(width: u32, height: u32) -> String {
    normalize_aspect_ratio(&format!("{width}:{height}"))
}

/// Picks the candidate dimension closest to `target_ratio`.
///
/// Ties on ratio distance go to the larger pixel area, then to the earlier
/// candidate. Candidates that are not dimensions are skipped.
pub fn best_dimension_for_ratio<S: AsRef<str>>(
    target_ratio: &str,
    candidates: &[S],
) -> Option<String> {
    let target = ratio_value(target_ratio)?;
    let mut best: Option<(f64, u64, String)> = None;
    for candidate in candidates {
        let Some((width, height)) = parse_dimensions(candidate.as_ref()) else {
            continue;
        };
        let delta = (f64::from(width) / f64::from(height) - target).abs();
        let area = u64::from(width) * u64::from(height);
        let better = match &best {
            None => true,
            Some((best_delta, best_area, _)) => {
                delta < best_delta - RATIO_EPSILON
                    || ((delta - best_delta).abs() <= RATIO_EPSILON && area > *best_area)
            }
        };
        if better {
            best = Some((delta, area, format!("{width}x{height}")));
        }
    }
    best.map(|(_, _, key)| key)
}

/// Snaps a ratio to the closest member of `allowed`; exact members pass through.
pub fn nearest_ratio<S: AsRef<str>>(target_ratio: &str, allowed: &[S]) -> Option<String> {
    let normalized = normalize_aspect_ratio(target_ratio);
    if normalized.is_empty() {
        return None;
    }
    if allowed.iter().any(|candidate| candidate.as_ref() == normalized) {
        return Some(normalized);
    }
    let target = ratio_value(&normalized)?;
    let mut best: Option<(f64, &str)> = None;
    for candidate in allowed {
        let Some(value) = ratio_value(candidate.as_ref()) else {
            continue;
        };
        let delta = (value - target).abs();
        if best.map(|(best_delta, _)| delta < best_delta).unwrap_or(true) {
            best = Some((delta, candidate.as_ref()));
        }
    }
    best.map(|(_, key)| key.to_string())
}

fn parse_decimal(raw: &str) -> Option<(f64, u32)> {
    if raw.is_empty() {
        return None;
    }
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|byte| byte.is_ascii_digit())
        || !fraction.bytes().all(|byte| byte.is_ascii_digit())
    {
        return None;
    }
    let value = raw.parse::<f64>().ok()?;
    let decimals = (fraction.len() as u32).min(MAX_RATIO_DECIMALS);
    Some((value, decimals))
}

fn gcd(mut left: u64, mut right: u64) -> u64 {
    while right != 0 {
        let next = left % right;
        left = right;
        right = next;
    }
    left.max(1)
}
