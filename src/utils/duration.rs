// Duration parsing and display for rc values, CLI flags and build timecost

use anyhow::Result;
use std::time::Duration;

/// Parse a duration expression such as `30s`, `10m`, `2h`, `1h30m` or a bare
/// number of seconds
pub fn parse_duration(expr: &str) -> Result<Duration> {
    let expr = expr.trim();
    if expr.is_empty() {
        anyhow::bail!("Duration cannot be empty");
    }
    if let Ok(secs) = expr.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_secs = 0u64;
    let mut digits = String::new();

    for ch in expr.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'd' => 86400,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => anyhow::bail!("Invalid duration format: {}", expr),
        };
        if digits.is_empty() {
            anyhow::bail!("Invalid duration format: {}", expr);
        }
        let value: u64 = digits.parse()?;
        total_secs = value
            .checked_mul(unit)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| anyhow::anyhow!("Duration out of range: {}", expr))?;
        digits.clear();
    }

    if !digits.is_empty() {
        anyhow::bail!("Invalid duration format: {} (missing unit)", expr);
    }

    Ok(Duration::from_secs(total_secs))
}

/// Format seconds for display (e.g., "1h2m3s", "4m0s", "12s")
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("1h30").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert!(parse_duration("300000000000000d").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
        assert!(parse_duration("99999999999999999999").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.0), "12s");
        assert_eq!(format_duration(240.4), "4m0s");
        assert_eq!(format_duration(3723.0), "1h2m3s");
        assert_eq!(format_duration(-5.0), "0s");
    }
}
