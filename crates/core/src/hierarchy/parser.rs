//! Child-reference discovery in free-text ticket bodies.
//!
//! Three forms are recognized and unioned:
//! 1. an explicit phrase: `child of #7`, `children: #7, #8`, `child is #7`
//! 2. a list item whose marker is directly followed by a reference:
//!    `- #7`, `* #7`, `+ #7`, `1. #7`, `- [ ] #7`, `[x] #7`
//! 3. list lines under a `### Children:` heading
//!
//! Everything here is pure: no I/O, same input gives same output.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// `child`/`children`, optional connector, then one or more references.
static EXPLICIT_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bchild(?:ren)?(?:\s+of|\s*:|\s+is|\s+are)?\s*#\d+(?:\s*(?:,|\band\b)\s*#\d+)*")
        .unwrap()
});

/// A list marker (bullet, ordinal or checkbox) directly followed by `#N`.
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:[-*+]|\d+\.)[ \t]+(?:\[[ xX]\][ \t]*)?|\[[ xX]\][ \t]*)#(\d+)",
    )
    .unwrap()
});

/// The `### Children:` heading.
static CHILDREN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*###[ \t]*Children:").unwrap());

/// Any markdown heading line.
static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ \t]*#{1,6}[ \t]").unwrap());

static REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\d+)").unwrap());

/// Location and content of a `### Children:` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenSection {
    /// Byte offset right after the `### Children:` heading text.
    pub heading_end: usize,
    /// Referenced ticket numbers in section order, deduplicated.
    pub entries: Vec<u64>,
}

impl ChildrenSection {
    pub fn contains(&self, number: u64) -> bool {
        self.entries.contains(&number)
    }
}

/// Child ticket numbers referenced by `body`, in order of first appearance.
///
/// `own_number` is never returned, even when the body mentions it. Numbers
/// that do not fit a `u64` are dropped.
pub fn child_references(body: &str, own_number: u64) -> Vec<u64> {
    let mut found: Vec<(usize, u64)> = Vec::new();

    for phrase in EXPLICIT_PHRASE.find_iter(body) {
        for reference in REFERENCE.captures_iter(phrase.as_str()) {
            if let Some(number) = reference.get(1).and_then(|m| m.as_str().parse().ok()) {
                let offset = phrase.start() + reference.get(0).map_or(0, |m| m.start());
                found.push((offset, number));
            }
        }
    }

    for item in LIST_ITEM.captures_iter(body) {
        if let Some(digits) = item.get(1) {
            if let Ok(number) = digits.as_str().parse() {
                found.push((digits.start(), number));
            }
        }
    }

    if let Some(section) = children_section(body) {
        // Section entries are list items and normally already found above;
        // they only add position-less confirmations.
        for number in section.entries {
            found.push((section.heading_end, number));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut children = Vec::new();
    for (_, number) in found {
        if number != own_number && !children.contains(&number) {
            children.push(number);
        }
    }
    children
}

/// Find the first `### Children:` section and the references listed in it.
///
/// The section runs until the next heading or a run of two blank lines.
pub fn children_section(body: &str) -> Option<ChildrenSection> {
    let heading = CHILDREN_HEADING.find(body)?;
    let heading_end = heading.end();

    let rest = &body[heading_end..];
    let after_heading_line = rest.find('\n').map_or(rest.len(), |i| i + 1);

    let mut entries = Vec::new();
    let mut blank_run = 0;
    for line in rest[after_heading_line..].lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 2 {
                break;
            }
            continue;
        }
        blank_run = 0;

        if HEADING_LINE.is_match(line) {
            break;
        }

        let number = LIST_ITEM
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        if let Some(number) = number {
            if !entries.contains(&number) {
                entries.push(number);
            }
        }
    }

    Some(ChildrenSection {
        heading_end,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_phrases() {
        assert_eq!(child_references("This is a child of #7", 1), vec![7]);
        assert_eq!(child_references("Children: #7", 1), vec![7]);
        assert_eq!(child_references("child is #7", 1), vec![7]);
        assert_eq!(child_references("children are #7", 1), vec![7]);
        assert_eq!(child_references("CHILD #7", 1), vec![7]);
    }

    #[test]
    fn test_explicit_phrase_with_list_of_references() {
        assert_eq!(
            child_references("children: #4, #5 and #6", 1),
            vec![4, 5, 6]
        );
    }

    #[test]
    fn test_phrase_needs_word_boundary() {
        assert!(child_references("grandchild of #7", 1).is_empty());
    }

    #[test]
    fn test_list_markers() {
        assert_eq!(child_references("- #7", 1), vec![7]);
        assert_eq!(child_references("* #7", 1), vec![7]);
        assert_eq!(child_references("+ #7", 1), vec![7]);
        assert_eq!(child_references("1. #7", 1), vec![7]);
        assert_eq!(child_references("12. #7", 1), vec![7]);
        assert_eq!(child_references("[ ] #7", 1), vec![7]);
        assert_eq!(child_references("[x] #7", 1), vec![7]);
    }

    #[test]
    fn test_task_list_items() {
        assert_eq!(child_references("- [ ] #7", 1), vec![7]);
        assert_eq!(child_references("- [x] #7 [Title](https://x/7)", 1), vec![7]);
        assert_eq!(child_references("  * [X] #7", 1), vec![7]);
    }

    #[test]
    fn test_list_items_need_line_start() {
        assert!(child_references("see - #7 for details", 1).is_empty());
        assert!(child_references("Related to #7", 1).is_empty());
    }

    #[test]
    fn test_children_section() {
        let body = "Intro\n\n### Children:\n- #7\n- [ ] #8\n";
        assert_eq!(child_references(body, 1), vec![7, 8]);

        let section = children_section(body).unwrap();
        assert_eq!(section.entries, vec![7, 8]);
        assert!(section.contains(8));
        assert!(!section.contains(9));
    }

    #[test]
    fn test_children_section_ends_at_heading() {
        let body = "### Children:\n- #7\n\n### Notes\n- #9\n";
        let section = children_section(body).unwrap();
        assert_eq!(section.entries, vec![7]);
    }

    #[test]
    fn test_children_section_ends_at_blank_run() {
        let body = "### Children:\n- #7\n\n- #8\n\n\n- #9\n";
        let section = children_section(body).unwrap();
        assert_eq!(section.entries, vec![7, 8]);
    }

    #[test]
    fn test_children_section_heading_position() {
        let body = "Top\n### Children:\n- #7";
        let section = children_section(body).unwrap();
        assert_eq!(&body[..section.heading_end], "Top\n### Children:");
    }

    #[test]
    fn test_no_children_section() {
        assert!(children_section("- #7").is_none());
    }

    #[test]
    fn test_own_number_excluded() {
        assert_eq!(child_references("child of #3\n- #3\n- #4", 3), vec![4]);
        assert!(child_references("### Children:\n- [ ] #5", 5).is_empty());
    }

    #[test]
    fn test_duplicates_across_forms_collapse() {
        let body = "child of #7\n\n### Children:\n- [ ] #7\n1. #7\n* #8";
        assert_eq!(child_references(body, 1), vec![7, 8]);
    }

    #[test]
    fn test_order_of_first_appearance() {
        let body = "- #9\nchild of #2\n- #5";
        assert_eq!(child_references(body, 1), vec![9, 2, 5]);
    }

    #[test]
    fn test_overflowing_number_dropped() {
        let body = "- #99999999999999999999999\n- #4";
        assert_eq!(child_references(body, 1), vec![4]);
    }

    #[test]
    fn test_parent_section_is_not_a_child() {
        let body = "### Parent:\n#10\n\nDetails";
        assert!(child_references(body, 11).is_empty());
    }

    #[test]
    fn test_crlf_bodies() {
        let body = "### Children:\r\n- [ ] #7\r\n- [ ] #8\r\n";
        assert_eq!(child_references(body, 1), vec![7, 8]);
        assert_eq!(children_section(body).unwrap().entries, vec![7, 8]);
    }

    #[test]
    fn test_pure() {
        let body = "child of #7\n- [ ] #8";
        assert_eq!(child_references(body, 1), child_references(body, 1));
    }
}
