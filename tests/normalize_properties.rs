//! Property tests for the output normalizer.

use iacflow::normalize::{
    ACTIONS_ANCHOR, LINE_BREAK_TOKEN, REFRESH_NOISE_MARKER, escape_line_breaks, normalize,
    truncate_refresh_noise, unescape_line_breaks,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn escaped_text_is_single_line(text in "[a-zA-Z0-9 .:%\n]{0,200}") {
        let escaped = escape_line_breaks(&text);
        prop_assert!(!escaped.contains('\n'));
        prop_assert_eq!(
            escaped.matches(LINE_BREAK_TOKEN).count(),
            text.matches('\n').count()
        );
        prop_assert_eq!(unescape_line_breaks(&escaped), text);
    }

    #[test]
    fn truncation_keeps_prefix_and_anchor_onward(
        prefix in "[a-z \n]{0,80}",
        noise in "[a-z \n]{0,80}",
        suffix in "[a-z \n]{0,80}",
    ) {
        let text = format!("{prefix}{REFRESH_NOISE_MARKER}{noise}{ACTIONS_ANCHOR}{suffix}");
        let truncated = truncate_refresh_noise(&text);
        prop_assert_eq!(truncated.as_ref(), format!("{prefix}{ACTIONS_ANCHOR}{suffix}"));
    }

    #[test]
    fn text_without_marker_is_untouched(text in "[a-z %\n]{0,200}") {
        let truncated = truncate_refresh_noise(&text);
        prop_assert_eq!(truncated.as_ref(), text.as_str());
        prop_assert_eq!(normalize(&text), escape_line_breaks(&text));
    }
}
