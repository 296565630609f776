//! Formatting of time spent hunting.

/// Render a number of minutes as `"{h} h {m} min"`, or `"{m} min"` below
/// one hour. Zero or negative input gives `"0 min"`.
pub fn format_time_spent(minutes: i64) -> String {
    if minutes <= 0 {
        return "0 min".to_string();
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_give_zero_value() {
        assert_eq!(format_time_spent(0), "0 min");
        assert_eq!(format_time_spent(-15), "0 min");
        assert_eq!(format_time_spent(i64::MIN), "0 min");
    }

    #[test]
    fn minutes_only() {
        assert_eq!(format_time_spent(45), "45 min");
    }

    #[test]
    fn whole_hours() {
        assert_eq!(format_time_spent(120), "2 h");
    }

    #[test]
    fn hours_and_minutes() {
        assert_eq!(format_time_spent(135), "2 h 15 min");
    }
}
