//! Normalization of free-form names into key segments.

/// Normalize a free-form name into a key segment.
///
/// Trims whitespace, lowercases, replaces every character outside
/// `[a-z0-9_-]` with `-`, collapses runs of `-` and `_` into a single `-`,
/// and strips leading and trailing `-`. The result never contains the key
/// separator but may be empty.
///
/// ```
/// use nodegraph_key::normalize_segment;
///
/// assert_eq!(normalize_segment("  Hello World "), "hello-world");
/// assert_eq!(normalize_segment("a__b--c"), "a-b-c");
/// ```
#[must_use]
pub fn normalize_segment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_delimiter = false;

    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_delimiter && !out.is_empty() {
                out.push('-');
            }
            pending_delimiter = false;
            out.push(c);
        } else {
            // Whitespace, punctuation, '_' and '-' all fold into one delimiter.
            pending_delimiter = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::already_clean("docs", "docs")]
    #[case::uppercase("Docs", "docs")]
    #[case::spaces("  my   docs ", "my-docs")]
    #[case::punctuation("example.com", "example-com")]
    #[case::mixed_delimiters("a_-_b", "a-b")]
    #[case::leading_trailing("--edge--", "edge")]
    #[case::separator("tool:name", "tool-name")]
    #[case::only_symbols("!!!", "")]
    #[case::empty("", "")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_segment(input), expected);
    }
}
