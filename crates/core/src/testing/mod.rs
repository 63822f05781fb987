//! Testing utilities and mock implementations.
//!
//! This module provides an in-memory tracker and a controllable clock so the
//! hierarchy and automation services can be exercised without GitHub.
//!
//! # Example
//!
//! ```rust,ignore
//! use issuetree_core::testing::{FixedClock, MockTicketGateway};
//!
//! let gateway = Arc::new(MockTicketGateway::new());
//! gateway.insert_ticket(3, "Epic", "").await;
//! gateway.set_latency(Duration::from_millis(10)).await;
//!
//! // Use in AppState...
//! ```

mod clock;
mod mock_gateway;

pub use clock::FixedClock;
pub use mock_gateway::MockTicketGateway;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{
        AutomationConfig, Config, DatabaseConfig, GitHubConfig, ServerConfig, TrackerBackend,
        TrackerConfig,
    };
    use crate::tracker::{Ticket, TicketState};

    /// An open ticket without labels.
    pub fn ticket(number: u64, title: &str, body: &str) -> Ticket {
        Ticket {
            number,
            title: title.to_string(),
            body: body.to_string(),
            state: TicketState::Open,
            labels: Vec::new(),
        }
    }

    /// A ticket whose `### Children:` section lists `children`.
    pub fn epic(number: u64, title: &str, children: &[u64]) -> Ticket {
        let mut body = String::from("### Children:");
        for child in children {
            body.push_str(&format!("\n- [ ] #{}", child));
        }
        ticket(number, title, &body)
    }

    /// A ticket whose `### Parent:` section points at `parent`.
    pub fn child_of(number: u64, title: &str, parent: u64) -> Ticket {
        ticket(number, title, &format!("### Parent:\n#{}", parent))
    }

    /// A valid configuration for the `acme/widgets` repository.
    pub fn config() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            tracker: TrackerConfig {
                backend: TrackerBackend::Github,
                github: Some(GitHubConfig::new("acme", "widgets")),
            },
            automation: AutomationConfig::default(),
        }
    }
}
