use settle_infra::external::InMemoryCollaborators;
use settle_infra::{EngineConfig, SettlementService};

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub settlement: SettlementService,
    /// In-process collaborator adapters, seeded through the admin routes.
    pub adapters: InMemoryCollaborators,
}

/// Wire the settlement service to the in-process collaborators.
pub fn build_services(config: EngineConfig) -> AppServices {
    let (settlement, adapters) = SettlementService::in_memory(config);
    tracing::info!(
        order_prefix = %settlement.config().order_number_prefix,
        max_attempts = settlement.config().job_max_attempts,
        "settlement services ready"
    );
    AppServices {
        settlement,
        adapters,
    }
}
