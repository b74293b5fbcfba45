//! Pure intent classification: a handful of case-insensitive pattern sets
//! that derive hint flags for the system prompt. Never fails; empty,
//! whitespace, or absent input yields every flag false.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intent {
    pub is_datetime_query: bool,
    pub is_device_query: bool,
    pub is_device_control_query: bool,
}

const DATETIME_PATTERNS: &[&str] = &[
    "what time is it",
    "what date is it",
    "what day is it",
    "what day of the week",
    "which day",
    "what's today",
    "todays date",
    "today's date",
    "today's day",
    "what's the date",
    "what's the time",
    "what's the day",
    "tell me the date",
    "tell me the time",
    "tell me the day",
    "current time",
    "current date",
];

const DEVICE_QUERY_PATTERNS: &[&str] = &["list devices", "show lights", "what do i have", "devices"];

fn matches_device_control(lower: &str) -> bool {
    let control_prefixes = ["turn on", "turn off", "dim", "brighten"];
    if control_prefixes.iter().any(|p| lower.contains(p)) {
        return true;
    }
    // "set ... to <number>"
    if let Some(set_idx) = lower.find("set ") {
        let rest = &lower[set_idx..];
        if let Some(to_idx) = rest.find(" to ") {
            let after_to = rest[to_idx + 4..].trim();
            let number_token = after_to.split_whitespace().next().unwrap_or("");
            if number_token.chars().any(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Classify free-form transcribed text into intent hints. Total: never
/// panics, never returns an error.
pub fn classify(text: Option<&str>) -> Intent {
    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Intent::default(),
    };
    let lower = text.to_lowercase();

    Intent {
        is_datetime_query: DATETIME_PATTERNS.iter().any(|p| lower.contains(p)),
        is_device_query: DEVICE_QUERY_PATTERNS
            .iter()
            .any(|p| lower == *p || lower.contains(p)),
        is_device_control_query: matches_device_control(&lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_null_and_whitespace_input_yield_all_false() {
        assert_eq!(classify(None), Intent::default());
        assert_eq!(classify(Some("")), Intent::default());
        assert_eq!(classify(Some("   ")), Intent::default());
    }

    #[test]
    fn datetime_queries_are_detected_case_insensitively() {
        assert!(classify(Some("What Time Is It?")).is_datetime_query);
        assert!(classify(Some("tell me the date please")).is_datetime_query);
    }

    #[test]
    fn device_query_detects_standalone_devices_word() {
        assert!(classify(Some("show me the devices")).is_device_query);
        assert!(classify(Some("list devices")).is_device_query);
    }

    #[test]
    fn device_control_detects_turn_on_and_set_to_number() {
        assert!(classify(Some("turn on the kitchen light")).is_device_control_query);
        assert!(classify(Some("set the thermostat to 70")).is_device_control_query);
        assert!(!classify(Some("set expectations")).is_device_control_query);
    }

    #[test]
    fn multiple_flags_can_be_true_simultaneously() {
        let intent = classify(Some("what time is it, and turn on the lights"));
        assert!(intent.is_datetime_query);
        assert!(intent.is_device_control_query);
    }

    #[test]
    fn classify_is_case_invariant() {
        let s = "What Time Is It";
        assert_eq!(classify(Some(s)), classify(Some(&s.to_uppercase())));
        assert_eq!(classify(Some(s)), classify(Some(&s.to_lowercase())));
    }
}
