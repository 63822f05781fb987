pub mod automation;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod metrics;
pub mod testing;
pub mod tracker;

use chrono::{DateTime, SecondsFormat, Utc};

pub use automation::{
    AutomationError, AutomationRecord, AutomationService, AutomationSnapshot, AutomationStatus,
    AutomationStore, SqliteAutomationStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use error::ErrorKind;
pub use hierarchy::{HierarchyError, HierarchySync, ReferenceEnhancer, UpdateSerializer};
pub use tracker::{GatewayError, GitHubGateway, Ticket, TicketGateway};

/// ISO-8601 UTC timestamp with milliseconds, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
