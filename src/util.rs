//! Small shared helpers

use std::time::Duration;

/// Parse a duration string like "30s", "5m", "1h" or "3h30m".
///
/// Bare numbers are seconds. Returns `None` for anything unparseable.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    // Bare seconds.
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut matched = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => {
                // "ms" vs minutes
                if chars.peek() == Some(&'s') {
                    chars.next();
                    total += Duration::from_millis(value);
                    matched = true;
                    continue;
                }
                60
            }
            's' => 1,
            _ => return None,
        };
        total += Duration::from_secs(value * unit);
        matched = true;
    }
    if !digits.is_empty() || !matched {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn compound_durations() {
        assert_eq!(
            parse_duration("3h30m"),
            Some(Duration::from_secs(3 * 3600 + 30 * 60))
        );
        assert_eq!(
            parse_duration("1h2m3s"),
            Some(Duration::from_secs(3723))
        );
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("3x"), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("3h30"), None);
    }
}
