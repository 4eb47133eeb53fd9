// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-bound string helpers.

/// Truncates `text` to at most `max` bytes, on a char boundary.
pub(crate) fn truncate_str(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Decodes bytes as UTF-8 (lossily) and truncates to `max` bytes.
///
/// Returns the text and whether anything was cut off.
pub(crate) fn decode_bounded(bytes: &[u8], max: usize) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    let bounded = truncate_str(&text, max);
    let truncated = bounded.len() < text.len();
    (bounded.to_string(), truncated)
}
