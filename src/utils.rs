/// Utility functions
/// Round to one decimal place
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Visibility uptime as a percentage of the full window. The divisor is
/// the configured capacity, not the fill level, so a half-full history
/// reads as partial uptime rather than 100%.
pub fn uptime_percent(history: &[bool], capacity: usize) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    let visible = history.iter().filter(|v| **v).count();
    round1(visible as f64 / capacity as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_nine_of_1800_is_half_percent() {
        let mut history = vec![false; 1800];
        for slot in history.iter_mut().take(9) {
            *slot = true;
        }
        assert_eq!(uptime_percent(&history, 1800), 0.5);
    }

    #[test]
    fn uptime_empty_window() {
        assert_eq!(uptime_percent(&[], 1800), 0.0);
        assert_eq!(uptime_percent(&[true, true], 0), 0.0);
    }

    #[test]
    fn uptime_partial_fill_divides_by_capacity() {
        let history = vec![true; 900];
        assert_eq!(uptime_percent(&history, 1800), 50.0);
    }

    #[test]
    fn rounding_helper() {
        assert_eq!(round1(0.4999), 0.5);
        assert_eq!(round1(99.96), 100.0);
    }
}
