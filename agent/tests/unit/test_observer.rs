//! Observer hot-swap tests

use std::sync::Arc;
use std::time::Duration;

use mission_agent::app::state::PlanScopeProvider;
use mission_agent::appliance::ApplianceFactory;
use mission_agent::filesys::dir::Dir;
use mission_agent::filesys::file::File;
use mission_agent::mission::MissionObserver;
use mission_agent::plan::JsonPlanFactory;

use crate::common::{eventually, FakeInstaller, FakeLoader, FakeSignalProvider};

fn plan_document(name: &str) -> String {
    format!(
        r#"{{
            "name": "{}",
            "wait_for_stop_seconds": 2,
            "deployments": [{{"name": "worker", "build": "1", "assembly": "true"}}]
        }}"#,
        name
    )
}

struct Fixture {
    observer: MissionObserver,
    plan_file: File,
    signals: Arc<FakeSignalProvider>,
    root: Dir,
}

async fn fixture() -> Fixture {
    let root = Dir::create_temp_dir("observer-test").await.unwrap();
    let plan_file = root.file("plan.json");
    let signals = Arc::new(FakeSignalProvider::cooperative());

    let provider = PlanScopeProvider::new(
        plan_file.clone(),
        Duration::from_millis(50),
        Arc::new(JsonPlanFactory::new()),
        Arc::new(FakeLoader::default()),
        Arc::new(FakeInstaller::new(&root.path().join("appliances"))),
        ApplianceFactory::with_signal_provider(signals.clone()),
    );

    Fixture {
        observer: MissionObserver::new(Arc::new(provider)),
        plan_file,
        signals,
        root,
    }
}

async fn current_plan(observer: &MissionObserver) -> Option<String> {
    observer.status().await.map(|status| status.name)
}

#[tokio::test]
async fn test_start_requires_a_plan() {
    let f = fixture().await;

    assert!(f.observer.start().await.is_err());
    assert!(!f.observer.is_active().await);
    assert!(!f.observer.check().await.unwrap());

    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_plan_change_swaps_mission() {
    let f = fixture().await;
    f.plan_file.write_string(&plan_document("first")).await.unwrap();

    f.observer.start().await.unwrap();
    f.observer.start().await.unwrap();
    assert_eq!(current_plan(&f.observer).await.as_deref(), Some("first"));
    let observer = &f.observer;
    assert!(
        eventually(Duration::from_secs(3), || async move {
            observer
                .status()
                .await
                .is_some_and(|status| status.start_complete)
        })
        .await
    );
    assert!(!f.observer.check().await.unwrap());

    f.plan_file.write_string(&plan_document("second")).await.unwrap();
    assert!(f.observer.check().await.unwrap());
    assert_eq!(current_plan(&f.observer).await.as_deref(), Some("second"));

    // The first mission's appliance was asked to stop during the swap
    assert!(f.signals.controllers()[0].was_stop_requested());

    f.observer.stop().await;
    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_reload_forces_a_swap() {
    let f = fixture().await;
    f.plan_file.write_string(&plan_document("steady")).await.unwrap();

    f.observer.start().await.unwrap();
    assert!(!f.observer.check().await.unwrap());

    f.observer.reload().await.unwrap();
    assert!(f.observer.check().await.unwrap());
    assert_eq!(current_plan(&f.observer).await.as_deref(), Some("steady"));
    assert!(!f.observer.check().await.unwrap());

    f.observer.stop().await;
    f.root.delete().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_safe_when_idle() {
    let f = fixture().await;
    f.plan_file.write_string(&plan_document("short")).await.unwrap();

    assert!(f.observer.stop().await.successful);

    f.observer.start().await.unwrap();
    assert!(f.observer.is_active().await);

    assert!(f.observer.stop().await.successful);
    assert!(!f.observer.is_active().await);
    assert!(f.observer.stop().await.successful);
    assert!(f.observer.status().await.is_none());

    f.root.delete().await.unwrap();
}
