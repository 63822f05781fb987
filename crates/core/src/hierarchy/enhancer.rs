//! Rewrites bare task-list references into titled links.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::metrics;
use crate::tracker::TicketGateway;

/// A task-list line ending right after its reference: `- [ ] #N`.
///
/// Group 1 is the part the link is appended to, group 2 the number. A line
/// with anything after the number (such as an existing link) is not bare.
static BARE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*[-*+][ \t]*\[[ xX]\][ \t]+#(\d+))[ \t]*\r?$").unwrap()
});

/// A bare reference found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareReference {
    pub number: u64,
    /// Byte offset where the link text is inserted.
    pub insert_at: usize,
    /// Byte offset of the end of the line content, trailing spaces included.
    pub line_end: usize,
}

/// Every bare task-list reference in `body`, in text order.
pub fn bare_references(body: &str) -> Vec<BareReference> {
    BARE_REFERENCE
        .captures_iter(body)
        .filter_map(|caps| {
            let prefix = caps.get(1)?;
            let number = caps.get(2)?.as_str().parse().ok()?;
            let whole = caps.get(0)?;
            let line_end = if whole.as_str().ends_with('\r') {
                whole.end() - 1
            } else {
                whole.end()
            };
            Some(BareReference {
                number,
                insert_at: prefix.end(),
                line_end,
            })
        })
        .collect()
}

/// Markdown link text for a title; brackets and line breaks would end it early.
fn link_text(title: &str) -> String {
    title
        .replace(['\r', '\n'], " ")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Resolves titles through the gateway and splices in `[title](url)` links.
#[derive(Clone)]
pub struct ReferenceEnhancer {
    gateway: Arc<dyn TicketGateway>,
}

impl ReferenceEnhancer {
    pub fn new(gateway: Arc<dyn TicketGateway>) -> Self {
        Self { gateway }
    }

    /// Return `body` with every resolvable bare reference linked.
    ///
    /// Each distinct number is fetched once. Lookups that fail leave their
    /// lines untouched. Running this on its own output changes nothing.
    pub async fn enhance(&self, body: &str) -> String {
        let references = bare_references(body);
        if references.is_empty() {
            return body.to_string();
        }

        let mut numbers: Vec<u64> = references.iter().map(|r| r.number).collect();
        numbers.sort_unstable();
        numbers.dedup();

        let lookups = numbers.iter().map(|&number| async move {
            match self.gateway.get_ticket(number).await {
                Ok(ticket) => Some((number, ticket.title)),
                Err(e) => {
                    warn!(number, error = %e, "Could not resolve title for #{}", number);
                    None
                }
            }
        });
        let titles: HashMap<u64, String> = join_all(lookups).await.into_iter().flatten().collect();

        let mut result = String::with_capacity(body.len() + titles.len() * 64);
        let mut last = 0;
        let mut enhanced = 0u64;
        for reference in &references {
            let Some(title) = titles.get(&reference.number) else {
                continue;
            };
            result.push_str(&body[last..reference.insert_at]);
            result.push_str(&format!(
                " [{}]({})",
                link_text(title),
                self.gateway.ticket_url(reference.number)
            ));
            // Trailing spaces after the bare number are dropped.
            last = reference.line_end;
            enhanced += 1;
        }
        result.push_str(&body[last..]);

        let unresolved = references.len() as u64 - enhanced;
        metrics::REFERENCES_ENHANCED
            .with_label_values(&["enhanced"])
            .inc_by(enhanced);
        metrics::REFERENCES_ENHANCED
            .with_label_values(&["unresolved"])
            .inc_by(unresolved);
        debug!(enhanced, unresolved, "Enhanced task-list references");

        result
    }
}
