//! Text helpers shared by the bots: title truncation, title cleanup, and
//! marker splicing for sidebar text.

use crate::error::{MirrorError, Result};

/// Fit `title` plus `rest` into `limit` characters
///
/// The title is cut (and suffixed with `..`) so that `title + rest` leaves room
/// for the two dots; `rest` is always kept intact. Lengths are in chars.
pub fn truncate_title(title: &str, rest: &str, limit: usize) -> String {
    let remaining = limit.saturating_sub(rest.chars().count() + 2);

    let mut out = String::with_capacity(title.len() + rest.len() + 2);
    if title.chars().count() > remaining {
        out.extend(title.chars().take(remaining));
        out.push_str("..");
    } else {
        out.push_str(title);
    }
    out.push_str(rest);
    out
}

/// Remove every occurrence of each pattern, then trim
pub fn strip_all<S: AsRef<str>>(title: &str, patterns: &[S]) -> String {
    let mut cleaned = title.to_string();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !pattern.is_empty() {
            cleaned = cleaned.replace(pattern, "");
        }
    }
    cleaned.trim().to_string()
}

/// Whether `title` contains any of the reject substrings
pub fn rejects<S: AsRef<str>>(title: &str, reject: &[S]) -> bool {
    reject
        .iter()
        .map(AsRef::as_ref)
        .any(|r| !r.is_empty() && title.contains(r))
}

/// Strip the global tags and the channel's own prefixes from a video title
pub fn clean_video_title<S: AsRef<str>, T: AsRef<str>>(
    title: &str,
    strip_tags: &[S],
    title_sub: &[T],
) -> String {
    let cleaned = strip_all(title, strip_tags);
    strip_all(&cleaned, title_sub)
}

/// Prefix a cleaned title with the channel name: `[Vinny] Title`
pub fn channel_title(channel: &str, cleaned_title: &str) -> String {
    format!("[{}] {}", channel, cleaned_title.trim())
}

/// Replace everything between `open` and `close` with `content`
///
/// The region runs from the end of the first `open` to the start of the last
/// `close`, so stale duplicate blocks inside it are removed as well. The new
/// block is written as `\n\n{content}\n`. Both markers are kept.
pub fn splice_between(text: &str, open: &str, close: &str, content: &str) -> Result<String> {
    let start = text
        .find(open)
        .ok_or_else(|| MirrorError::InvalidInput(format!("opening marker {} not found", open)))?;
    let after_open = start + open.len();

    let close_at = text
        .rfind(close)
        .filter(|&pos| pos >= after_open)
        .ok_or_else(|| {
            MirrorError::InvalidInput(format!("closing marker {} not found after {}", close, open))
        })?;

    Ok(format!(
        "{}\n\n{}\n{}",
        &text[..after_open],
        content,
        &text[close_at..]
    ))
}
