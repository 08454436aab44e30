//! Merging the numeric re-scan into the primary recognition text.

/// Value the numeric pass read right after the last `marker`.
///
/// `None` when the secondary text has no marker or nothing follows it.
pub fn trusted_value<'a>(secondary: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    let (_, tail) = secondary.rsplit_once(marker)?;
    tail.split_whitespace().next()
}

/// Replace the value after every `marker` in `primary` with the value the
/// numeric pass read after its last marker.
///
/// The numeric pass is trusted for digits only, so the surrounding words of
/// the primary text are kept. Without a trusted value `primary` is returned
/// unchanged.
pub fn merge(primary: &str, secondary: &str, marker: &str) -> String {
    let Some(value) = trusted_value(secondary, marker) else {
        return primary.to_string();
    };

    let mut merged = String::with_capacity(primary.len() + value.len());
    let mut rest = primary;

    while let Some(pos) = rest.find(marker) {
        merged.push_str(&rest[..pos]);
        merged.push_str(marker);
        merged.push(' ');
        merged.push_str(value);

        let after = rest[pos + marker.len()..].trim_start_matches([' ', '\t']);
        let token_end = after.find(char::is_whitespace).unwrap_or(after.len());
        rest = &after[token_end..];
    }
    merged.push_str(rest);

    merged
}
