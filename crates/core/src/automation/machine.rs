//! The automation state machine.

use std::sync::Arc;

use mockable::Clock;
use thiserror::Error;
use tracing::{debug, info};

use super::{
    AutomationPriority, AutomationRecord, AutomationSnapshot, AutomationStatus, AutomationStep,
    AutomationStore, AutomationStoreError, AutomationUpdate, StartAutomation, StepStatus,
    StepUpdate,
};
use crate::error::ErrorKind;
use crate::hierarchy::UpdateSerializer;
use crate::metrics;
use crate::tracker::{GatewayError, TicketGateway};

/// Errors from automation operations.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Ticket #{0} not found")]
    NotFound(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tracker call for #{number} failed: {source}")]
    Upstream { number: u64, source: GatewayError },

    #[error("Automation record for #{number} could not be stored: {source}")]
    Store {
        number: u64,
        source: AutomationStoreError,
    },
}

impl AutomationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::NotFound(_) => ErrorKind::NotFound,
            AutomationError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AutomationError::Upstream { .. } => ErrorKind::UpstreamFailure,
            AutomationError::Store { source, .. } => source.kind(),
        }
    }
}

/// Drives the automation fields of tickets.
///
/// The ticket itself must exist in the tracker; the automation fields live in
/// an [`AutomationStore`]. Changes to one ticket's record are serialized on
/// the ticket number, and every change is validated in full before anything
/// is written.
pub struct AutomationService {
    gateway: Arc<dyn TicketGateway>,
    store: Arc<dyn AutomationStore>,
    serializer: Arc<UpdateSerializer>,
    clock: Arc<dyn Clock + Send + Sync>,
    default_estimated_minutes: u32,
}

impl AutomationService {
    pub fn new(
        gateway: Arc<dyn TicketGateway>,
        store: Arc<dyn AutomationStore>,
        serializer: Arc<UpdateSerializer>,
        clock: Arc<dyn Clock + Send + Sync>,
        default_estimated_minutes: u32,
    ) -> Self {
        Self {
            gateway,
            store,
            serializer,
            clock,
            default_estimated_minutes,
        }
    }

    /// Begin a run: `in-progress`, seeded with an `Initialize` step.
    ///
    /// A run that is in progress or paused cannot be restarted; a finished
    /// run is replaced by a fresh one.
    pub async fn start(
        &self,
        number: u64,
        request: StartAutomation,
    ) -> Result<AutomationRecord, AutomationError> {
        let priority = match request.priority.as_deref() {
            Some(priority) => priority
                .parse::<AutomationPriority>()
                .map_err(AutomationError::InvalidArgument)?,
            None => AutomationPriority::default(),
        };
        // Zero means "no estimate", same as leaving it out.
        let estimate = request
            .estimated_minutes
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.default_estimated_minutes);

        self.serializer
            .run(number, move || async move {
                self.require_ticket(number).await?;

                if let Some(existing) = self.load(number)? {
                    if matches!(
                        existing.status,
                        AutomationStatus::InProgress | AutomationStatus::Paused
                    ) {
                        return Err(AutomationError::InvalidArgument(format!(
                            "automation for #{} is already {}",
                            number, existing.status
                        )));
                    }
                }

                let now = self.clock.utc();
                let mut record = AutomationRecord::untouched(number);
                record.status = AutomationStatus::InProgress;
                record.priority = priority;
                record.start_time = Some(now);
                record.estimated_minutes = Some(estimate);
                record.steps.push(AutomationStep {
                    id: "1".to_string(),
                    name: "Initialize".to_string(),
                    status: StepStatus::InProgress,
                    progress: 10,
                    start_time: Some(now),
                    end_time: None,
                    details: Some("Starting automation process".to_string()),
                });
                record.log(now, "Automation started");

                self.persist(&record)?;
                metrics::AUTOMATION_TRANSITIONS
                    .with_label_values(&[AutomationStatus::InProgress.as_str()])
                    .inc();
                info!("Started automation for #{} (estimate {} min)", number, estimate);
                Ok(record)
            })
            .await
    }

    /// Apply any combination of status change, step merge and log line.
    ///
    /// Nothing is written when any part is invalid.
    pub async fn apply_update(
        &self,
        number: u64,
        update: AutomationUpdate,
    ) -> Result<AutomationRecord, AutomationError> {
        let status = update
            .status
            .as_deref()
            .map(str::parse::<AutomationStatus>)
            .transpose()
            .map_err(AutomationError::InvalidArgument)?;
        let step_status = update
            .step
            .as_ref()
            .and_then(|step| step.status.as_deref())
            .map(str::parse::<StepStatus>)
            .transpose()
            .map_err(AutomationError::InvalidArgument)?;
        let step_progress = update
            .step
            .as_ref()
            .and_then(|step| step.progress)
            .map(|progress| {
                u8::try_from(progress)
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or_else(|| {
                        AutomationError::InvalidArgument(format!(
                            "step progress must be between 0 and 100, got {}",
                            progress
                        ))
                    })
            })
            .transpose()?;
        if let Some(step) = &update.step {
            if step.id.trim().is_empty() {
                return Err(AutomationError::InvalidArgument(
                    "step id must not be empty".to_string(),
                ));
            }
        }

        self.serializer
            .run(number, move || async move {
                self.require_ticket(number).await?;

                let mut record = self
                    .load(number)?
                    .unwrap_or_else(|| AutomationRecord::untouched(number));
                let now = self.clock.utc();
                let mut transitioned = None;

                if let Some(next) = status {
                    if !record.status.can_transition_to(next) {
                        return Err(AutomationError::InvalidArgument(format!(
                            "cannot move automation for #{} from {} to {}",
                            number, record.status, next
                        )));
                    }
                    if next != record.status {
                        record.status = next;
                        if next == AutomationStatus::InProgress && record.start_time.is_none() {
                            record.start_time = Some(now);
                        }
                        if next.is_terminal() {
                            record.finish(now);
                        }
                        transitioned = Some(next);
                    }
                }

                if let Some(step) = update.step {
                    merge_step(&mut record, step, step_status, step_progress, now)?;
                }

                if let Some(text) = update.log.as_deref() {
                    record.log(now, text);
                }

                self.persist(&record)?;
                if let Some(next) = transitioned {
                    metrics::AUTOMATION_TRANSITIONS
                        .with_label_values(&[next.as_str()])
                        .inc();
                    info!("Automation for #{} is now {}", number, next);
                } else {
                    debug!("Updated automation for #{}", number);
                }
                Ok(record)
            })
            .await
    }

    /// Current automation fields of a ticket.
    ///
    /// A ticket that exists but never ran automation yields the defaults with
    /// `started = false`; a missing ticket is `NotFound`.
    pub async fn status(&self, number: u64) -> Result<AutomationSnapshot, AutomationError> {
        self.require_ticket(number).await?;

        Ok(match self.load(number)? {
            Some(record) => AutomationSnapshot {
                started: true,
                record,
            },
            None => AutomationSnapshot {
                started: false,
                record: AutomationRecord::untouched(number),
            },
        })
    }

    /// Number of tickets with a stored automation record.
    pub fn record_count(&self) -> Result<u64, AutomationStoreError> {
        self.store.count()
    }

    async fn require_ticket(&self, number: u64) -> Result<(), AutomationError> {
        match self.gateway.get_ticket(number).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(AutomationError::NotFound(number)),
            Err(source) => Err(AutomationError::Upstream { number, source }),
        }
    }

    fn load(&self, number: u64) -> Result<Option<AutomationRecord>, AutomationError> {
        self.store
            .get(number)
            .map_err(|source| AutomationError::Store { number, source })
    }

    fn persist(&self, record: &AutomationRecord) -> Result<(), AutomationError> {
        self.store
            .save(record)
            .map_err(|source| AutomationError::Store {
                number: record.ticket_number,
                source,
            })
    }
}

/// Merge into the step with the same id or append a new one.
fn merge_step(
    record: &mut AutomationRecord,
    update: StepUpdate,
    status: Option<StepStatus>,
    progress: Option<u8>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), AutomationError> {
    if let Some(step) = record.steps.iter_mut().find(|s| s.id == update.id) {
        if let Some(name) = update.name {
            step.name = name;
        }
        if let Some(status) = status {
            step.status = status;
            if status.is_finished() {
                step.end_time = Some(now);
            }
        }
        if let Some(progress) = progress {
            step.progress = progress;
        }
        if update.details.is_some() {
            step.details = update.details;
        }
        return Ok(());
    }

    let name = update
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            AutomationError::InvalidArgument(format!("new step '{}' needs a name", update.id))
        })?;
    let status = status.unwrap_or_default();
    record.steps.push(AutomationStep {
        id: update.id,
        name,
        status,
        progress: progress.unwrap_or(0),
        start_time: Some(now),
        end_time: status.is_finished().then_some(now),
        details: update.details,
    });
    Ok(())
}
