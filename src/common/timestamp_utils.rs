use chrono::{DateTime, Local};

// Get current local timestamp as a formatted string
pub fn current_local_timestamp_str(format_str: &str) -> String {
    let now: DateTime<Local> = Local::now();
    now.format(format_str).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_date_time_format_has_fixed_width() {
        let stamp = current_local_timestamp_str("%Y%m%d_%H%M%S");
        assert_eq!(stamp.len(), 15);
        assert_eq!(stamp.as_bytes()[8], b'_');
    }
}
