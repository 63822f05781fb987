use std::sync::Arc;

use issuetree_core::{
    AutomationService, AutomationStore, Config, HierarchySync, SanitizedConfig, TicketGateway,
    UpdateSerializer,
};
use mockable::Clock;

/// Shared application state
pub struct AppState {
    config: Config,
    gateway: Arc<dyn TicketGateway>,
    hierarchy: HierarchySync,
    automation: AutomationService,
}

impl AppState {
    /// Wire the hierarchy and automation services around one tracker.
    ///
    /// Both services share a single [`UpdateSerializer`] so every write to a
    /// ticket number goes through the same lock.
    pub fn new(
        config: Config,
        gateway: Arc<dyn TicketGateway>,
        store: Arc<dyn AutomationStore>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let serializer = Arc::new(UpdateSerializer::new());
        let hierarchy = HierarchySync::new(Arc::clone(&gateway), Arc::clone(&serializer));
        let automation = AutomationService::new(
            Arc::clone(&gateway),
            store,
            serializer,
            clock,
            config.automation.default_estimated_minutes,
        );

        Self {
            config,
            gateway,
            hierarchy,
            automation,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn gateway(&self) -> &dyn TicketGateway {
        self.gateway.as_ref()
    }

    pub fn hierarchy(&self) -> &HierarchySync {
        &self.hierarchy
    }

    pub fn automation(&self) -> &AutomationService {
        &self.automation
    }
}
