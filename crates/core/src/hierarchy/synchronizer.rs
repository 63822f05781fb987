//! Bidirectional parent/child back-links kept in ticket bodies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::enhancer::ReferenceEnhancer;
use super::parser::{child_references, children_section};
use super::sections::{parent_reference, with_child, with_parent};
use super::serializer::UpdateSerializer;
use crate::error::ErrorKind;
use crate::metrics;
use crate::tracker::{GatewayError, NewTicket, Ticket, TicketGateway, TicketUpdate};

/// Labels that mark a ticket for automated processing.
pub const AUTOMATION_LABELS: &[&str] = &["automation", "ai-task"];

/// Errors from hierarchy operations on the primary ticket.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("Ticket #{0} not found")]
    NotFound(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tracker call for {subject} failed: {source}")]
    Upstream {
        subject: String,
        source: GatewayError,
    },
}

impl HierarchyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HierarchyError::NotFound(_) => ErrorKind::NotFound,
            HierarchyError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            HierarchyError::Upstream { .. } => ErrorKind::UpstreamFailure,
        }
    }

    fn from_gateway(number: u64, error: GatewayError) -> Self {
        if error.is_not_found() {
            HierarchyError::NotFound(number)
        } else {
            HierarchyError::Upstream {
                subject: format!("#{}", number),
                source: error,
            }
        }
    }
}

/// Request to create a ticket, optionally under a parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTicketRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub parent: Option<u64>,
}

/// A back-link write that failed during fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanOutFailure {
    /// Ticket whose body could not be read or written.
    pub number: u64,
    pub message: String,
}

/// Result of an explicit body update.
///
/// The primary write succeeded; `failures` lists the linked tickets that
/// could not be brought in line.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub ticket: Ticket,
    pub children: Vec<u64>,
    pub failures: Vec<FanOutFailure>,
}

/// Maintains `### Parent:` and `### Children:` sections on both ends of each
/// relationship.
///
/// Every body rewrite runs under the [`UpdateSerializer`] lock of the ticket
/// being rewritten. Nothing is rolled back across tickets: once the primary
/// write succeeded, back-link failures are logged and reported but never
/// fail the call.
#[derive(Clone)]
pub struct HierarchySync {
    gateway: Arc<dyn TicketGateway>,
    serializer: Arc<UpdateSerializer>,
    enhancer: ReferenceEnhancer,
}

impl HierarchySync {
    pub fn new(gateway: Arc<dyn TicketGateway>, serializer: Arc<UpdateSerializer>) -> Self {
        let enhancer = ReferenceEnhancer::new(gateway.clone());
        Self {
            gateway,
            serializer,
            enhancer,
        }
    }

    pub fn serializer(&self) -> &Arc<UpdateSerializer> {
        &self.serializer
    }

    /// Create a ticket and link it into the hierarchy in the background.
    ///
    /// A requested parent is written into the new body as part of the create
    /// call. Registration with the parent and back-links to children found in
    /// the body run on a spawned task after the create returns; their
    /// failures only show up in the logs.
    pub async fn create_ticket(&self, request: NewTicketRequest) -> Result<Ticket, HierarchyError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(HierarchyError::InvalidArgument(
                "title must not be empty".to_string(),
            ));
        }

        let body = match request.parent {
            Some(parent) => with_parent(&request.body, parent),
            None => request.body.clone(),
        };

        let ticket = self
            .gateway
            .create_ticket(NewTicket {
                title: title.to_string(),
                body,
                labels: request.labels.clone(),
            })
            .await
            .map_err(|source| HierarchyError::Upstream {
                subject: "new ticket".to_string(),
                source,
            })?;

        info!("Created ticket #{}", ticket.number);

        let sync = self.clone();
        let number = ticket.number;
        let parent = request.parent;
        let original_body = request.body;
        tokio::spawn(async move {
            let failures = sync.fan_out(number, &original_body, parent).await;
            if !failures.is_empty() {
                warn!(
                    "Background linking of #{} left {} ticket(s) out of sync",
                    number,
                    failures.len()
                );
            }
        });

        Ok(ticket)
    }

    /// Replace a ticket's body and bring linked tickets in line.
    ///
    /// Bare task-list references are enhanced before the write. Fan-out is
    /// awaited; a failing child does not stop the others and never fails the
    /// call. A parent section that differs from the previous body's gets the
    /// ticket registered with it. A body naming the ticket as its own parent,
    /// or listing it under its own `### Children:`, is rejected up front.
    pub async fn update_body(&self, number: u64, body: String) -> Result<UpdateOutcome, HierarchyError> {
        if parent_reference(&body) == Some(number) {
            return Err(HierarchyError::InvalidArgument(format!(
                "ticket #{} cannot be its own parent",
                number
            )));
        }
        if children_section(&body).is_some_and(|section| section.contains(number)) {
            return Err(HierarchyError::InvalidArgument(format!(
                "ticket #{} cannot be its own child",
                number
            )));
        }

        let body = self.enhancer.enhance(&body).await;

        let gateway = self.gateway.as_ref();
        let (previous_parent, written) = self
            .serializer
            .run(number, move || async move {
                let current = gateway
                    .get_ticket(number)
                    .await
                    .map_err(|e| HierarchyError::from_gateway(number, e))?;
                let written = gateway
                    .update_ticket(number, TicketUpdate::new().with_body(body))
                    .await
                    .map_err(|e| HierarchyError::from_gateway(number, e))?;
                Ok::<_, HierarchyError>((parent_reference(&current.body), written))
            })
            .await?;

        let new_parent = parent_reference(&written.body)
            .filter(|parent| *parent != number && Some(*parent) != previous_parent);
        let children = child_references(&written.body, number);
        let failures = self.fan_out(number, &written.body, new_parent).await;

        let ticket = self.refreshed(written, !children.is_empty()).await;
        Ok(UpdateOutcome {
            ticket,
            children,
            failures,
        })
    }

    /// Point a ticket's `### Parent:` section at `parent`.
    ///
    /// Registration with the parent only happens when the recorded parent
    /// actually changed.
    pub async fn set_parent(&self, number: u64, parent: u64) -> Result<Ticket, HierarchyError> {
        if number == parent {
            return Err(HierarchyError::InvalidArgument(format!(
                "ticket #{} cannot be its own parent",
                number
            )));
        }

        let gateway = self.gateway.as_ref();
        let (previous_parent, ticket) = self
            .serializer
            .run(number, move || async move {
                let current = gateway
                    .get_ticket(number)
                    .await
                    .map_err(|e| HierarchyError::from_gateway(number, e))?;
                let previous = parent_reference(&current.body);
                let body = with_parent(&current.body, parent);
                let ticket = gateway
                    .update_ticket(number, TicketUpdate::new().with_body(body))
                    .await
                    .map_err(|e| HierarchyError::from_gateway(number, e))?;
                Ok::<_, HierarchyError>((previous, ticket))
            })
            .await?;

        if previous_parent == Some(parent) {
            debug!("Parent of #{} unchanged (#{})", number, parent);
        } else if let Err(e) = self.register_child(parent, number).await {
            self.record_failure(parent, &e);
        }

        Ok(ticket)
    }

    /// Ensure `child` is listed under the parent's `### Children:` section.
    ///
    /// Returns whether the parent body was written. Registering the same pair
    /// twice leaves a single entry.
    pub async fn register_child(&self, parent: u64, child: u64) -> Result<bool, HierarchyError> {
        if parent == child {
            return Err(HierarchyError::InvalidArgument(format!(
                "ticket #{} cannot be its own child",
                parent
            )));
        }

        let gateway = self.gateway.as_ref();
        let written = self
            .serializer
            .run(parent, move || async move {
                let current = gateway
                    .get_ticket(parent)
                    .await
                    .map_err(|e| HierarchyError::from_gateway(parent, e))?;
                let Some(body) = with_child(&current.body, child) else {
                    return Ok(false);
                };
                gateway
                    .update_ticket(parent, TicketUpdate::new().with_body(body))
                    .await
                    .map_err(|e| HierarchyError::from_gateway(parent, e))?;
                Ok::<_, HierarchyError>(true)
            })
            .await?;

        Self::record_write(written);
        if written {
            debug!("Registered #{} as child of #{}", child, parent);
        }
        Ok(written)
    }

    /// Re-derive every back-link of a ticket from its current body.
    ///
    /// Covers drift left behind by earlier fan-out failures.
    pub async fn resync(&self, number: u64) -> Result<UpdateOutcome, HierarchyError> {
        let ticket = self
            .gateway
            .get_ticket(number)
            .await
            .map_err(|e| HierarchyError::from_gateway(number, e))?;

        let parent = parent_reference(&ticket.body).filter(|p| *p != number);
        let children = child_references(&ticket.body, number);
        let failures = self.fan_out(number, &ticket.body, parent).await;

        info!(
            "Resynced #{}: {} child(ren), {} failure(s)",
            number,
            children.len(),
            failures.len()
        );

        let ticket = self.refreshed(ticket, !children.is_empty()).await;
        Ok(UpdateOutcome {
            ticket,
            children,
            failures,
        })
    }

    /// Write the back-links implied by `body` of ticket `number`.
    async fn fan_out(&self, number: u64, body: &str, parent: Option<u64>) -> Vec<FanOutFailure> {
        let mut failures = Vec::new();

        if let Some(parent) = parent {
            if let Err(e) = self.register_child(parent, number).await {
                failures.push(self.record_failure(parent, &e));
            }
        }

        for child in child_references(body, number) {
            if Some(child) == parent {
                warn!("#{} lists its own parent #{} as a child, skipping", number, child);
                continue;
            }
            if let Err(e) = self.link_parent(child, number).await {
                failures.push(self.record_failure(child, &e));
                continue;
            }
            if let Err(e) = self.register_child(number, child).await {
                failures.push(self.record_failure(number, &e));
            }
        }

        failures
    }

    /// Point the child's parent section at `parent`.
    async fn link_parent(&self, child: u64, parent: u64) -> Result<bool, HierarchyError> {
        let gateway = self.gateway.as_ref();
        let written = self
            .serializer
            .run(child, move || async move {
                let current = gateway
                    .get_ticket(child)
                    .await
                    .map_err(|e| HierarchyError::from_gateway(child, e))?;
                let body = with_parent(&current.body, parent);
                if body == current.body {
                    return Ok(false);
                }
                gateway
                    .update_ticket(child, TicketUpdate::new().with_body(body))
                    .await
                    .map_err(|e| HierarchyError::from_gateway(child, e))?;
                Ok::<_, HierarchyError>(true)
            })
            .await?;

        Self::record_write(written);
        Ok(written)
    }

    /// Fetch the ticket again when fan-out may have rewritten it.
    async fn refreshed(&self, ticket: Ticket, changed: bool) -> Ticket {
        if !changed {
            return ticket;
        }
        match self.gateway.get_ticket(ticket.number).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Could not refetch #{} after fan-out: {}", ticket.number, e);
                ticket
            }
        }
    }

    fn record_write(written: bool) {
        let result = if written { "written" } else { "unchanged" };
        metrics::BACKLINK_WRITES.with_label_values(&[result]).inc();
    }

    fn record_failure(&self, number: u64, e: &HierarchyError) -> FanOutFailure {
        metrics::BACKLINK_WRITES.with_label_values(&["failed"]).inc();
        error!("Hierarchy fan-out failed for #{}: {}", number, e);
        FanOutFailure {
            number,
            message: e.to_string(),
        }
    }
}
