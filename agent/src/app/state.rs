//! Application state management

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::app::options::{AppOptions, RepositoryOptions};
use crate::appliance::ApplianceFactory;
use crate::artifacts::{DirectoryApplianceLoader, HttpApplianceLoader, ZipApplianceInstaller};
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::mission::lifecycle::Mission;
use crate::mission::observer::{MissionObserver, MissionScope, ScopeProvider};
use crate::mission::orchestrator::MissionOrchestrator;
use crate::mission::traits::{ApplianceInstaller, ApplianceLoader, PlanFactory, PlanSource};
use crate::plan::{FilePlanSource, FilePlanWriter, JsonPlanFactory};
use crate::storage::layout::StorageLayout;

/// Builds one mission per plan, each with its own plan source
pub struct PlanScopeProvider {
    plan_file: File,
    polling_interval: Duration,
    plan_factory: Arc<dyn PlanFactory>,
    loader: Arc<dyn ApplianceLoader>,
    installer: Arc<dyn ApplianceInstaller>,
    appliances: ApplianceFactory,
}

impl PlanScopeProvider {
    pub fn new(
        plan_file: File,
        polling_interval: Duration,
        plan_factory: Arc<dyn PlanFactory>,
        loader: Arc<dyn ApplianceLoader>,
        installer: Arc<dyn ApplianceInstaller>,
        appliances: ApplianceFactory,
    ) -> Self {
        Self {
            plan_file,
            polling_interval,
            plan_factory,
            loader,
            installer,
            appliances,
        }
    }
}

#[async_trait]
impl ScopeProvider for PlanScopeProvider {
    async fn open_scope(&self) -> Result<MissionScope, AgentError> {
        let plan_source = Arc::new(FilePlanSource::new(
            self.plan_file.clone(),
            self.polling_interval,
        ));
        let plan = self.plan_factory.create(plan_source.as_ref(), true).await?;
        info!(
            "Opening mission scope for plan {} ({} unit(s))",
            plan.name,
            plan.deployments.len()
        );

        let mission = Mission::new(
            plan,
            self.loader.clone(),
            self.installer.clone(),
            self.appliances.clone(),
        );
        let plan_source: Arc<dyn PlanSource> = plan_source;
        Ok(MissionScope {
            plan_source,
            mission,
        })
    }
}

/// Main application state
pub struct AppState {
    /// Storage layout
    pub layout: StorageLayout,

    /// Mission bound to the active plan
    pub observer: Arc<MissionObserver>,

    /// Artifact refresher for incoming plans
    pub orchestrator: Arc<MissionOrchestrator>,
}

impl AppState {
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        let layout = options.storage.layout.clone();
        layout.setup().await?;

        let loader: Arc<dyn ApplianceLoader> = match &options.repository {
            RepositoryOptions::Directory(path) => {
                info!("Using package repository {}", path.display());
                Arc::new(DirectoryApplianceLoader::new(
                    path.clone(),
                    layout.repository_cache_dir(),
                ))
            }
            RepositoryOptions::Http(url) => {
                info!("Using package repository {}", url);
                Arc::new(HttpApplianceLoader::new(url, layout.repository_cache_dir())?)
            }
        };
        let installer: Arc<dyn ApplianceInstaller> =
            Arc::new(ZipApplianceInstaller::new(layout.appliances_dir()));
        let plan_factory: Arc<dyn PlanFactory> = Arc::new(JsonPlanFactory::new());

        let plan_file = match &options.plan_file {
            Some(path) => File::new(path),
            None => layout.plan_file(),
        };

        let provider = PlanScopeProvider::new(
            plan_file.clone(),
            options.plan_polling_interval,
            plan_factory.clone(),
            loader.clone(),
            installer.clone(),
            ApplianceFactory::new(),
        );
        let observer = Arc::new(MissionObserver::new(Arc::new(provider)));

        let incoming = Arc::new(FilePlanSource::new(
            layout.incoming_plan_file(),
            options.orchestrator.polling_interval,
        ));
        let orchestrator = Arc::new(MissionOrchestrator::new(
            options.orchestrator.clone(),
            incoming,
            plan_factory,
            loader,
            installer,
            Arc::new(FilePlanWriter::new(plan_file)),
        ));

        Ok(Self {
            layout,
            observer,
            orchestrator,
        })
    }
}
