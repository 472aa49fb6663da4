mod common;

use common::TestMap;
use serde_json::json;
use skymap_cloud::StubDriver;
use skymap_engine::MapRunner;

#[tokio::test]
async fn full_map_run_is_idempotent() {
    let scenario = TestMap::new(StubDriver::new("ec2"))
        .with_profile("db", "prod:ec2")
        .with_profile("web", "prod:ec2")
        .with_instance("db", "db1", json!({}))
        .with_instance("db", "db2", json!({}))
        .with_instance("web", "web1", json!({"requires": ["db1", "db2"]}));

    let mut runner = MapRunner::new(
        scenario.cloud("prod"),
        scenario.options(),
        scenario.profiles.clone(),
        scenario.rendered.clone(),
    );
    let plan = runner.map_data().await.unwrap();
    assert_eq!(plan.create.len(), 3);
    assert!(plan.existing.is_empty());

    let output = runner.run_map(plan).await.unwrap();
    assert_eq!(output.len(), 3);
    let created = scenario.stub.created();
    let web_pos = created.iter().position(|n| n == "web1").unwrap();
    assert!(created.iter().position(|n| n == "db1").unwrap() < web_pos);
    assert!(created.iter().position(|n| n == "db2").unwrap() < web_pos);

    // A second run against the same provider plans nothing new.
    let mut second = MapRunner::new(
        scenario.cloud("prod"),
        scenario.options(),
        scenario.profiles.clone(),
        scenario.rendered.clone(),
    );
    let plan = second.map_data().await.unwrap();
    assert!(plan.create.is_empty());
    assert_eq!(plan.existing.len(), 3);

    let output = second.run_map(plan).await.unwrap();
    for result in output.values() {
        assert_eq!(result["Message"], "Already running");
    }
    assert_eq!(scenario.stub.created().len(), 3);
}

#[tokio::test]
async fn hard_map_tears_down_unclaimed_instances() {
    let scenario = TestMap::new(StubDriver::new("ec2").with_node("prod", "stray1", "running"))
        .with_profile("web", "prod:ec2")
        .with_instance("web", "web1", json!({}));

    let mut options = scenario.options();
    options.hard = true;
    options.enable_hard_maps = true;

    let mut runner = MapRunner::new(
        scenario.cloud("prod"),
        options,
        scenario.profiles.clone(),
        scenario.rendered.clone(),
    );
    let plan = runner.map_data().await.unwrap();
    assert_eq!(plan.create.len(), 1);
    assert_eq!(plan.destroy.len(), 1);

    let output = runner.run_map(plan).await.unwrap();
    assert_eq!(scenario.stub.created(), vec!["web1"]);
    assert_eq!(scenario.stub.destroyed(), vec!["stray1"]);
    assert!(output.contains_key("stray1"));
}

#[tokio::test]
async fn parallel_run_provisions_in_level_batches() {
    let scenario = TestMap::new(StubDriver::new("ec2"))
        .with_profile("db", "prod:ec2")
        .with_profile("web", "prod:ec2")
        .with_instance("db", "db1", json!({}))
        .with_instance("db", "db2", json!({}))
        .with_instance("web", "web1", json!({"requires": ["db1", "db2"]}))
        .with_instance("web", "web2", json!({"requires": ["web1"]}));

    let mut options = scenario.options();
    options.parallel = true;
    options.pool_size = Some(2);

    let mut runner = MapRunner::new(
        scenario.cloud("prod"),
        options,
        scenario.profiles.clone(),
        scenario.rendered.clone(),
    );
    let plan = runner.map_data().await.unwrap();
    let output = runner.run_map(plan).await.unwrap();
    assert_eq!(output.len(), 4);

    let created = scenario.stub.created();
    let pos = |name: &str| created.iter().position(|n| n == name).unwrap();
    assert!(pos("db1") < pos("web1"));
    assert!(pos("db2") < pos("web1"));
    assert!(pos("web1") < pos("web2"));
}

#[tokio::test]
async fn terminated_instances_are_recreated() {
    let scenario = TestMap::new(StubDriver::new("ec2").with_node("prod", "web1", "terminated"))
        .with_profile("web", "prod:ec2")
        .with_instance("web", "web1", json!({}));

    let mut runner = MapRunner::new(
        scenario.cloud("prod"),
        scenario.options(),
        scenario.profiles.clone(),
        scenario.rendered.clone(),
    );
    let plan = runner.map_data().await.unwrap();
    assert!(plan.create.contains_key("web1"));

    runner.run_map(plan).await.unwrap();
    assert_eq!(scenario.stub.created(), vec!["web1"]);
}
