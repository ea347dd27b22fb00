//! Plan files, package loading and installation

use std::io::{Cursor, Write};

use mission_agent::errors::AgentError;
use mission_agent::filesys::dir::Dir;
use mission_agent::mission::traits::{ApplianceInstaller, ApplianceLoader, PlanFactory, PlanSource};
use mission_agent::plan::{FilePlanSource, FilePlanWriter, JsonPlanFactory};
use mission_agent::artifacts::{DirectoryApplianceLoader, ZipApplianceInstaller};
use mission_agent::utils::sha256_hash;
use mission_models::{DeploymentUnit, Plan};
use serde_json::json;
use zip::write::SimpleFileOptions;

fn package(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn publish(repository: &Dir, name: &str, build: &str, content: &[u8]) {
    repository
        .subdir(name)
        .subdir(build)
        .file(&format!("{}.zip", name))
        .write_bytes(content)
        .await
        .unwrap();
}

#[test]
fn test_plan_round_trip_keeps_order_and_configuration() {
    let mut plan = Plan::new("round-trip");
    plan.repository_version = "20250101120000000".to_string();
    for name in ["c", "a", "b"] {
        let mut unit = DeploymentUnit::new(name, "1", "run.sh");
        unit.configuration = json!({"port": 8080, "tags": [name], "nested": {"on": true}});
        unit.has_installed = true;
        plan.deployments.push(unit);
    }

    let json = serde_json::to_string(&plan).unwrap();
    let parsed: Plan = serde_json::from_str(&json).unwrap();

    let names: Vec<&str> = parsed.deployments.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["c", "a", "b"]);
    assert_eq!(parsed.deployments[1].configuration["tags"][0], "a");
    assert_eq!(parsed.deployments[2].configuration["nested"]["on"], true);
    assert!(!parsed.deployments[0].has_installed);
    assert_eq!(parsed.repository_version, plan.repository_version);
}

#[tokio::test]
async fn test_saved_plan_is_read_back() {
    let dir = Dir::create_temp_dir("plan-files").await.unwrap();
    let factory = JsonPlanFactory::new();
    let writer = FilePlanWriter::new(dir.file("plan.json"));

    let mut plan = Plan::new("saved");
    plan.deployments.push(DeploymentUnit::new("gateway", "2", "gateway.sh"));
    factory.create_repository_version(&mut plan);
    factory.save(&plan, &writer).await.unwrap();

    let source = FilePlanSource::new(dir.file("plan.json"), std::time::Duration::from_secs(1));
    assert!(source.has_updated_plan().await.unwrap());

    let loaded = factory.create(&source, true).await.unwrap();
    assert_eq!(loaded.name, "saved");
    assert_eq!(loaded.repository_version, plan.repository_version);
    assert!(!loaded.deployments[0].uid.is_empty());
    assert!(!source.has_updated_plan().await.unwrap());

    let peeked = factory.create(&source, false).await.unwrap();
    assert_eq!(peeked.name, "saved");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_unit_unloaded() {
    let root = Dir::create_temp_dir("checksum").await.unwrap();
    let repository = root.subdir("repository");
    let content = package(&[("run.sh", "#!/bin/sh\n")]);
    publish(&repository, "gateway", "1.0", &content).await;

    let loader = DirectoryApplianceLoader::new(repository.path(), root.subdir("cache"));
    let plan = Plan::new("checks");

    let mut good = DeploymentUnit::new("gateway", "1.0", "run.sh");
    good.checksum = sha256_hash(&content);
    loader.load(&plan, &mut good).await.unwrap();
    assert!(good.has_loaded);
    assert_eq!(good.repository_content, content);
    assert!(root.subdir("cache").exists().await);

    let mut bad = DeploymentUnit::new("gateway", "1.0", "run.sh");
    bad.checksum = sha256_hash(b"something else");
    let result = loader.load(&plan, &mut bad).await;
    assert!(matches!(result, Err(AgentError::ChecksumMismatch { .. })));
    assert!(!bad.has_loaded);
    assert!(bad.repository_content.is_empty());

    let mut missing = DeploymentUnit::new("gateway", "9.9", "run.sh");
    let result = loader.load(&plan, &mut missing).await;
    assert!(matches!(result, Err(AgentError::NotFound(_))));

    let mut skipped = DeploymentUnit::new("absent", "1", "run.sh");
    skipped.deploy = false;
    loader.load(&plan, &mut skipped).await.unwrap();
    assert!(!skipped.has_loaded);

    loader.clean(&plan).await.unwrap();
    assert!(!root.subdir("cache").exists().await);

    root.delete().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_packaged_appliance_lifecycle() {
    use mission_agent::appliance::ApplianceFactory;
    use mission_agent::mission::Mission;

    const SHIM: &str = r#"#!/bin/sh
echo $$ > "$MISSION_SIGNAL_DIR/started"
while [ ! -f "$MISSION_SIGNAL_DIR/stop-requested" ]; do sleep 0.1; done
date > "$MISSION_SIGNAL_DIR/stopped"
"#;

    let root = Dir::create_temp_dir("packaged").await.unwrap();
    let repository = root.subdir("repository");
    let content = package(&[("run.sh", SHIM)]);
    publish(&repository, "shim", "1.0", &content).await;

    let mut plan = Plan::new("packaged");
    plan.wait_for_start_seconds = 5;
    plan.wait_for_stop_seconds = 5;
    let mut unit = DeploymentUnit::new("shim", "1.0", "run.sh");
    unit.checksum = sha256_hash(&content);
    unit.wait_for_start = true;
    plan.deployments.push(unit);

    let mission = Mission::new(
        plan,
        std::sync::Arc::new(DirectoryApplianceLoader::new(repository.path(), root.subdir("cache"))),
        std::sync::Arc::new(ZipApplianceInstaller::new(root.subdir("appliances"))),
        ApplianceFactory::new(),
    );

    let deploy = mission.deploy().await;
    assert!(deploy.successful, "{:?}", deploy.details);
    let installed = mission.plan().deployments[0].installation_location.clone();
    assert!(installed.ends_with("shim"));
    assert!(mission.plan().deployments[0].repository_content.is_empty());

    let start = mission.start().await;
    assert!(start.successful, "{:?}", start.details);
    assert!(start.details.iter().any(|d| d.explanation == "Confirmed started"));
    assert!(mission.start_complete().await);

    let status = mission.get_appliances().await;
    assert!(status[0].has_started);
    assert!(!status[0].has_stopped);

    let stop = mission.stop().await;
    assert!(stop.successful, "{:?}", stop.details);
    assert!(!stop.details.iter().any(|d| d.explanation.contains("Not every appliance")));
    assert!(mission.get_appliances().await.is_empty());

    root.delete().await.unwrap();
}

#[tokio::test]
async fn test_installer_rejects_corrupt_package() {
    let root = Dir::create_temp_dir("corrupt").await.unwrap();
    let installer = ZipApplianceInstaller::new(root.subdir("appliances"));

    let mut unit = DeploymentUnit::new("gateway", "1.0", "run.sh");
    unit.repository_content = b"PK but not really".to_vec();
    unit.has_loaded = true;

    let result = installer.install(&Plan::new("p"), &mut unit).await;
    assert!(matches!(result, Err(AgentError::InstallError(_))));
    assert!(!unit.has_installed);

    root.delete().await.unwrap();
}
