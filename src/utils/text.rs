//! Text processing utilities.

/// Lower-case and collapse all internal whitespace runs to single spaces,
/// trimming the ends. Deterministic: the same input always yields the same
/// output, which the pipeline relies on for reproducible re-embedding.
pub fn collapse_whitespace(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Hello   World  "), "hello world");
        assert_eq!(collapse_whitespace("a\tb\nc"), "a b c");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace("   \n\t  "), "");
        assert_eq!(collapse_whitespace("MiXeD CaSe"), "mixed case");
    }

}
