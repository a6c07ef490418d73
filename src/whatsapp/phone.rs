const SEPARATORS: &[char] = &[' ', '-', '(', ')', '.', '/', '\\', ':'];

/// Reduce a human-entered phone number to its digits.
///
/// Separators are stripped first, then anything before the last colon,
/// a leading `+`, every remaining non-digit and finally a leading `00`
/// international prefix. An empty result means the input held no digits.
pub fn normalize_phone_number(phone_number: &str) -> String {
    let mut cleaned: String = phone_number
        .trim()
        .chars()
        .filter(|c| !SEPARATORS.contains(c))
        .collect();

    if let Some((_, tail)) = cleaned.rsplit_once(':') {
        cleaned = tail.trim().to_string();
    }

    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = match digits.strip_prefix("00") {
        Some(rest) => rest.to_string(),
        None => digits,
    };

    if digits.is_empty() {
        tracing::error!("Invalid phone number (no digits): '{}'", phone_number);
    } else {
        tracing::debug!("Normalized phone number '{}' -> '{}'", phone_number, digits);
    }
    digits
}
