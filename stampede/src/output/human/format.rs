use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

/// Single rounded component: `850ms`, `12s`, `3m04s`.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let secs = (ms + 500) / 1_000;
    if secs < 60 {
        return format!("{secs}s");
    }
    format!("{}m{:02}s", secs / 60, secs % 60)
}

/// Latency values from the metrics snapshot are microseconds.
pub(crate) fn format_micros(v: Option<f64>) -> String {
    let Some(us) = v.filter(|v| v.is_finite()) else {
        return "n/a".to_string();
    };
    if us >= 1_000_000.0 {
        format!("{:.2}s", us / 1_000_000.0)
    } else if us >= 1_000.0 {
        format!("{:.2}ms", us / 1_000.0)
    } else {
        format!("{us:.0}us")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_uses_one_rounded_unit() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(11_600)), "12s");
        assert_eq!(format_elapsed(Duration::from_secs(184)), "3m04s");
    }

    #[test]
    fn micros_pick_a_readable_unit() {
        assert_eq!(format_micros(None), "n/a");
        assert_eq!(format_micros(Some(640.0)), "640us");
        assert_eq!(format_micros(Some(12_346.0)), "12.35ms");
        assert_eq!(format_micros(Some(2_500_000.0)), "2.50s");
    }
}
