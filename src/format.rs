//! Human-readable rendering of counts and latencies.

/// Abbreviate large counts: `1.5M`, `1.5K`, otherwise the plain number.
pub fn format_number(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.1}K", n / 1_000.0)
    } else {
        format!("{}", n)
    }
}

/// Render a millisecond duration at a sensible unit.
pub fn format_duration(ms: f64) -> String {
    if ms < 1.0 {
        "<1ms".to_string()
    } else if ms < 1_000.0 {
        format!("{}ms", ms.round())
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else {
        format!("{:.1}m", ms / 60_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1_500_000.0), "1.5M");
        assert_eq!(format_number(1_000_000.0), "1.0M");
        assert_eq!(format_number(1_500.0), "1.5K");
        assert_eq!(format_number(1_000.0), "1.0K");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.5), "<1ms");
        assert_eq!(format_duration(45.0), "45ms");
        assert_eq!(format_duration(999.0), "999ms");
        assert_eq!(format_duration(1_500.0), "1.5s");
        assert_eq!(format_duration(5_000.0), "5.0s");
        assert_eq!(format_duration(90_000.0), "1.5m");
    }
}
