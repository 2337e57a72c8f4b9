//! Output filename sanitization.

/// Characters that are illegal or hazardous in filenames on at least one
/// supported platform.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum characters kept before the extension is appended.
const MAX_LEN: usize = 200;

/// Turn a page or stream title into a safe filename stem: forbidden
/// characters stripped, whitespace collapsed, trimmed, capped at 200
/// characters. A title that sanitizes to nothing becomes `"download"`.
pub fn sanitize_title(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_LEN).collect();
    let trimmed = truncated.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_forbidden_characters() {
        assert_eq!(
            sanitize_title(r#"What? A "Video": part 1/2"#),
            "What A Video part 12"
        );
        assert_eq!(sanitize_title(r"C:\clips\raw|final*"), "Cclipsrawfinal");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_title("  a \t b \n  c  "), "a b c");
    }

    #[test]
    fn truncates_to_two_hundred_characters() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_title(&long).chars().count(), 200);
        // Multibyte characters count as characters, not bytes.
        let wide = "日".repeat(500);
        assert_eq!(sanitize_title(&wide).chars().count(), 200);
    }

    #[test]
    fn empty_input_falls_back() {
        assert_eq!(sanitize_title(""), "download");
        assert_eq!(sanitize_title("???"), "download");
        assert_eq!(sanitize_title("   "), "download");
    }

    proptest! {
        #[test]
        fn output_is_always_safe(input in ".*") {
            let out = sanitize_title(&input);
            prop_assert!(!out.is_empty());
            prop_assert!(out.chars().count() <= 200);
            prop_assert!(!out.chars().any(|c| FORBIDDEN.contains(&c)));
            prop_assert_eq!(out.trim(), &out);
        }
    }
}
