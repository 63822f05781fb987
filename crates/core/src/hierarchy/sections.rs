//! Rewrites of the `### Parent:` and `### Children:` sections of a body.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::parser::children_section;

pub const PARENT_HEADING: &str = "### Parent:";
pub const CHILDREN_HEADING: &str = "### Children:";

/// The `### Parent:` heading plus the reference under it, when there is one.
static PARENT_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*###[ \t]*Parent:[ \t]*(?:(?:\r?\n[ \t]*)*#(\d+))?").unwrap()
});

/// Task-list entry registered under `### Children:`.
pub fn child_entry(child: u64) -> String {
    format!("- [ ] #{}", child)
}

/// Parent number recorded in the body, if any.
pub fn parent_reference(body: &str) -> Option<u64> {
    PARENT_SECTION
        .captures_iter(body)
        .find_map(|caps| caps.get(1).and_then(|m| m.as_str().parse().ok()))
}

/// Body with its `### Parent:` section pointing at `parent`.
///
/// The first existing heading is rewritten in place, whether or not a number
/// follows it, and any further ones are removed. Without a heading a section
/// is prepended.
pub fn with_parent(body: &str, parent: u64) -> String {
    let section = format!("{}\n#{}", PARENT_HEADING, parent);

    let mut matches = PARENT_SECTION.find_iter(body);
    let Some(first) = matches.next() else {
        if body.trim().is_empty() {
            return section;
        }
        return format!("{}\n\n{}", section, body);
    };

    let mut result = String::with_capacity(body.len() + section.len());
    result.push_str(&body[..first.start()]);
    result.push_str(&section);
    let mut last = first.end();
    for duplicate in matches {
        result.push_str(&body[last..duplicate.start()]);
        last = duplicate.end();
    }
    result.push_str(&body[last..]);
    result
}

/// Body with `child` registered under `### Children:`.
///
/// Returns `None` when the section already lists the child. New entries go
/// directly below the heading, so the newest child is listed first. A body
/// without the section gets one appended.
pub fn with_child(body: &str, child: u64) -> Option<String> {
    let entry = child_entry(child);

    match children_section(body) {
        Some(section) if section.contains(child) => None,
        Some(section) => {
            let rest = &body[section.heading_end..];
            match rest.find('\n') {
                Some(newline) => {
                    let at = section.heading_end + newline + 1;
                    Some(format!("{}{}\n{}", &body[..at], entry, &body[at..]))
                }
                None => Some(format!("{}\n{}", body, entry)),
            }
        }
        None if body.trim().is_empty() => Some(format!("{}\n{}", CHILDREN_HEADING, entry)),
        None => Some(format!(
            "{}\n\n{}\n{}",
            body.trim_end(),
            CHILDREN_HEADING,
            entry
        )),
    }
}
