//! ISO-8601 duration slots, e.g. `PT3M` or `PT1M30S`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SkillError;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(?P<w>\d+)W)?(?:(?P<d>\d+)D)?(?:T(?:(?P<h>\d+)H)?(?:(?P<m>\d+)M)?(?:(?P<s>\d+)S)?)?$",
    )
    .expect("Invalid duration regex")
});

/// Parse a duration into whole seconds.
///
/// Weeks, days, hours, minutes and seconds are accepted. Years and months
/// have no fixed length and are rejected, as is an empty `P` or `PT`.
pub fn parse_duration_secs(input: &str) -> Result<u32, SkillError> {
    let value = input.trim().to_ascii_uppercase();
    let invalid = || SkillError::InvalidDuration(input.to_string());

    let caps = DURATION_RE.captures(&value).ok_or_else(invalid)?;
    if value.ends_with('T') {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    let mut any = false;
    for (group, unit) in [("w", 604_800u64), ("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if let Some(m) = caps.name(group) {
            let n: u64 = m.as_str().parse().map_err(|_| invalid())?;
            total = n
                .checked_mul(unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(invalid)?;
            any = true;
        }
    }
    if !any {
        return Err(invalid());
    }
    u32::try_from(total).map_err(|_| invalid())
}
