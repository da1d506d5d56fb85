//! Post-processing for captured tool output.
//!
//! Two independent transforms are applied in order: [`truncate_refresh_noise`]
//! drops the drift report the tool prints before its action list, then
//! [`escape_line_breaks`] folds the text onto a single line for `key=value`
//! transport. Only the second step is reversible. Literal `%` is escaped as
//! well so that decoding never invents line breaks.

use std::borrow::Cow;

/// Sentence that opens the drift report emitted after a state refresh.
pub const REFRESH_NOISE_MARKER: &str = "Note: Objects have changed outside of Terraform";

/// Sentence that opens the planned action list.
pub const ACTIONS_ANCHOR: &str = "Terraform will perform the following actions";

/// Token substituted for each line feed by [`escape_line_breaks`].
pub const LINE_BREAK_TOKEN: &str = "%0A";

/// Token substituted for each literal `%` by [`escape_line_breaks`].
pub const PERCENT_TOKEN: &str = "%25";

/// Removes everything from the first `marker` up to the first `anchor` that
/// follows it, keeping the anchor itself.
///
/// Text without the marker, or with no anchor after it, is returned
/// unchanged.
#[must_use]
pub fn truncate_between<'a>(text: &'a str, marker: &str, anchor: &str) -> Cow<'a, str> {
    let Some(start) = text.find(marker) else {
        return Cow::Borrowed(text);
    };
    let Some(offset) = text
        .get(start + marker.len()..)
        .and_then(|tail| tail.find(anchor))
    else {
        return Cow::Borrowed(text);
    };

    let end = start + marker.len() + offset;
    let mut trimmed = text.to_owned();
    trimmed.replace_range(start..end, "");
    Cow::Owned(trimmed)
}

/// Drops the refresh drift report that precedes the planned actions.
#[must_use]
pub fn truncate_refresh_noise(text: &str) -> Cow<'_, str> {
    truncate_between(text, REFRESH_NOISE_MARKER, ACTIONS_ANCHOR)
}

/// Replaces every line feed with [`LINE_BREAK_TOKEN`], after replacing
/// every `%` with [`PERCENT_TOKEN`].
#[must_use]
pub fn escape_line_breaks(text: &str) -> String {
    text.replace('%', PERCENT_TOKEN).replace('\n', LINE_BREAK_TOKEN)
}

/// Reverses [`escape_line_breaks`].
#[must_use]
pub fn unescape_line_breaks(text: &str) -> String {
    text.replace(LINE_BREAK_TOKEN, "\n").replace(PERCENT_TOKEN, "%")
}

/// Applies both transforms in order: noise truncation, then escaping.
#[must_use]
pub fn normalize(text: &str) -> String {
    escape_line_breaks(&truncate_refresh_noise(text))
}
