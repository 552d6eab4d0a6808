//! Message text for the notification channel.

use crate::domain::ItemDescriptor;

/// Caption for a newly published item.
///
/// The link line is always kept; the title is shortened when the whole
/// caption would exceed `max_len`. Lengths are UTF-16 code units, which is
/// how Telegram counts message and caption limits.
pub fn item_caption(handle: &str, item: &ItemDescriptor, max_len: usize) -> String {
    let header = format!("🎬 New video from @{handle}");
    let link = format!("Original: {}", item.url.trim());
    let title = normalize_title(&item.title);

    if title.is_empty() {
        return truncate_units(&format!("{header}\n{link}"), max_len);
    }

    let fixed = unit_len(&header) + unit_len(&link) + 2;
    let room = max_len.saturating_sub(fixed);
    if room == 0 {
        return truncate_units(&format!("{header}\n{link}"), max_len);
    }

    let title = truncate_units(&title, room);
    format!("{header}\n{title}\n{link}")
}

pub fn startup_notice(handle: &str, interval_secs: u64) -> String {
    format!("👋 Bot online. Watching @{handle} every {interval_secs}s.")
}

pub fn pass_failure_notice(error: &str) -> String {
    format!("⚠️ Scan failed: {}", truncate_units(error, 500))
}

/// Collapse whitespace runs (feeds often carry multi-line descriptions).
fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length in UTF-16 code units.
pub fn unit_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Truncate to at most `max_len` UTF-16 units, marking the cut with `…`.
/// Never splits a character.
pub fn truncate_units(s: &str, max_len: usize) -> String {
    if unit_len(s) <= max_len {
        return s.to_string();
    }
    if max_len == 0 {
        return String::new();
    }
    let budget = max_len - 1; // '…' is one unit
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        out.push(c);
    }
    out.push('…');
    out
}
