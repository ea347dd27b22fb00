//! Orchestrator tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mission_agent::errors::AgentError;
use mission_agent::filesys::dir::Dir;
use mission_agent::mission::orchestrator::Options;
use mission_agent::mission::traits::PlanFactory;
use mission_agent::mission::{MissionOrchestrator, PlanConfigurator};
use mission_agent::plan::JsonPlanFactory;
use mission_models::Plan;
use tokio_test::assert_ok;

use crate::common::{FakeInstaller, FakeLoader, MemoryPlanSource, MemoryPlanWriter};

const SHARED_BUILD_PLAN: &str = r#"{
    "name": "line-1",
    "deployments": [
        {"name": "gateway", "alias": "gateway-a", "build": "2.1", "assembly": "gateway.sh"},
        {"name": "gateway", "alias": "gateway-b", "build": "2.1", "assembly": "gateway.sh"},
        {"name": "logger", "build": "0.4", "assembly": "logger.sh"}
    ]
}"#;

struct Fixture {
    orchestrator: MissionOrchestrator,
    source: Arc<MemoryPlanSource>,
    loader: Arc<FakeLoader>,
    installer: Arc<FakeInstaller>,
    writer: Arc<MemoryPlanWriter>,
    root: Dir,
}

async fn fixture(document: &str) -> Fixture {
    let root = Dir::create_temp_dir("orchestrator-test").await.unwrap();
    let source = Arc::new(MemoryPlanSource::new(document));
    let loader = Arc::new(FakeLoader::default());
    let installer = Arc::new(FakeInstaller::new(root.path()));
    let writer = Arc::new(MemoryPlanWriter::default());

    let orchestrator = MissionOrchestrator::new(
        Options {
            polling_interval: Duration::from_millis(50),
            max_shutdown_delay: Duration::from_secs(2),
        },
        source.clone(),
        Arc::new(JsonPlanFactory::new()),
        loader.clone(),
        installer.clone(),
        writer.clone(),
    );

    Fixture {
        orchestrator,
        source,
        loader,
        installer,
        writer,
        root,
    }
}

#[tokio::test]
async fn test_run_once_fetches_each_build_once() {
    let f = fixture(SHARED_BUILD_PLAN).await;

    assert!(assert_ok!(f.orchestrator.run_once().await));

    assert_eq!(f.loader.load_count(), 2);
    assert_eq!(f.loader.clean_count(), 1);
    assert_eq!(f.installer.install_count(), 2);
    assert_eq!(f.source.consumed_count(), 1);

    let saved = f.writer.last_plan().unwrap();
    assert_eq!(saved.name, "line-1");
    assert_eq!(saved.repository_version.len(), 17);
    assert_eq!(saved.deployments.len(), 3);
    assert!(saved.deployments[0]
        .installation_location
        .ends_with("gateway-a"));
    assert_eq!(saved.deployments[1].alias, "gateway-b");
    assert!(saved.deployments[1].installation_location.is_empty());
    assert!(saved.deployments[2]
        .installation_location
        .ends_with("logger"));

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_run_once_without_update_does_nothing() {
    let f = fixture(SHARED_BUILD_PLAN).await;

    assert!(f.orchestrator.run_once().await.unwrap());
    assert!(!f.orchestrator.run_once().await.unwrap());
    assert_eq!(f.loader.load_count(), 2);
    assert_eq!(f.writer.write_count(), 1);

    f.source.publish(SHARED_BUILD_PLAN);
    assert!(f.orchestrator.run_once().await.unwrap());
    assert_eq!(f.writer.write_count(), 2);

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_run_once_propagates_plan_errors() {
    let f = fixture("{ not a plan").await;

    let result = f.orchestrator.run_once().await;
    assert!(matches!(result, Err(AgentError::PlanError(_))));
    assert_eq!(f.loader.clean_count(), 0);
    assert_eq!(f.writer.write_count(), 0);

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_terminate_reports_failed_job() {
    let f = fixture("").await;

    assert!(f.orchestrator.run().await.successful);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!f.orchestrator.is_running().await);

    let outcome = f.orchestrator.terminate().await;
    assert!(!outcome.successful);

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_background_polling_picks_up_new_plans() {
    let f = fixture(SHARED_BUILD_PLAN).await;

    assert!(f.orchestrator.run().await.successful);
    assert!(!f.orchestrator.run().await.successful);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(f.writer.write_count(), 1);

    f.source.publish(r#"{"name": "line-2"}"#);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.writer.last_plan().unwrap().name, "line-2");

    let outcome = f.orchestrator.terminate().await;
    assert!(outcome.successful);
    assert!(!f.orchestrator.is_running().await);

    f.root.delete().await.unwrap();
}

struct FixedVersion;

#[async_trait]
impl PlanConfigurator for FixedVersion {
    async fn configure_plan(
        &self,
        plan: &mut Plan,
        _factory: &dyn PlanFactory,
    ) -> Result<(), AgentError> {
        plan.repository_version = "fixed".to_string();
        plan.all_appliances_must_deploy = true;
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_configurator() {
    let f = fixture(SHARED_BUILD_PLAN).await;
    let orchestrator = assert_ok!(f.orchestrator.with_configurator(Arc::new(FixedVersion)));

    assert!(orchestrator.run_once().await.unwrap());

    let saved = f.writer.last_plan().unwrap();
    assert_eq!(saved.repository_version, "fixed");
    assert!(saved.all_appliances_must_deploy);

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_builds_get_one_load_and_install() {
    let f = fixture(
        r#"{
            "name": "pair",
            "deployments": [
                {"name": "gateway", "alias": "a", "build": "2.1", "assembly": "gateway.sh"},
                {"name": "gateway", "alias": "b", "build": "2.1", "assembly": "gateway.sh"}
            ]
        }"#,
    )
    .await;

    assert!(f.orchestrator.run_once().await.unwrap());
    assert_eq!(f.loader.load_count(), 1);
    assert_eq!(f.installer.install_count(), 1);

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_configurator_rejected_while_polling() {
    let f = fixture(SHARED_BUILD_PLAN).await;

    assert!(f.orchestrator.run().await.successful);
    let result = f.orchestrator.with_configurator(Arc::new(FixedVersion));
    assert!(matches!(result, Err(AgentError::ConfigError(_))));

    f.root.delete().await.unwrap();
}
