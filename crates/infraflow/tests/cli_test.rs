#![allow(deprecated)] // Command::cargo_bin

mod common;

use assert_cmd::Command;
use common::{ACI_GATEWAY, TestProject, infra_in};
use predicates::prelude::*;

const NETWORK: &str = r#"
stack "network"

resource_group "net" {
    name "net"
    location "westeurope"
}

virtual_network "vnet" {
    name "vnet"
    resource_group_name "${net.name}"
    address_spaces "10.0.0.0/16"
}

subnet "snet" {
    name "default"
    resource_group_name "${net.name}"
    virtual_network_name "${vnet.name}"
    address_prefix "10.0.1.0/24"
}

public_ip "ip" {
    name "ip"
    resource_group_name "${net.name}"
    allocation_method "Static"
    domain_name_label "network-test"
}

output "url" "http://${ip.fqdn}/"
"#;

/// The help lists every command
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("outputs"))
        .stdout(predicate::str::contains("--state-dir"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("infraflow"));
}

#[test]
fn test_up_help() {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.arg("up")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("infra").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_invalid_parallelism() {
    let project = TestProject::new();
    project
        .infra()
        .args(["--parallelism", "many", "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--parallelism"));
}

#[test]
fn test_plan_without_project() {
    let dir = tempfile::tempdir().unwrap();
    infra_in(dir.path())
        .env("INFRAFLOW_STACK_PATH", dir.path().join("missing.kdl"))
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("INFRAFLOW_STACK_PATH"));
}

#[test]
fn test_validate() {
    let project = TestProject::new();
    project.write_stack_kdl(NETWORK);

    project
        .infra()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stack is valid"))
        .stdout(predicate::str::contains("Resources: 4"))
        .stdout(predicate::str::contains("Apply levels: 3"));
}

#[test]
fn test_validate_rejects_name_declared_in_two_files() {
    let project = TestProject::new();
    project.write_stack_kdl(
        r#"
resource_group "app" {
    name "app"
}
"#,
    );
    project.write_resource_file(
        "groups",
        r#"
resource_group "app" {
    name "other"
}
"#,
    );

    project
        .infra()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Resource 'app' is declared more than once",
        ));
}

#[test]
fn test_validate_reports_cycle() {
    let project = TestProject::new();
    project.write_stack_kdl(
        r#"
subnet "a" {
    name "a"
    route_table_id "${b.id}"
}

subnet "b" {
    name "b"
    route_table_id "${a.id}"
}
"#,
    );

    project
        .infra()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dependency cycle detected"));
}

#[test]
fn test_undeclared_reference_fails_before_apply() {
    let project = TestProject::new();
    project.write_stack_kdl(&NETWORK.replace("${vnet.name}", "${missing.name}"));

    project
        .infra()
        .args(["up", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'missing'"));
    assert!(!project.state_file().exists());
}

#[test]
fn test_graph() {
    let project = TestProject::new();
    project.write_stack_kdl(NETWORK);

    project
        .infra()
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("Level 0"))
        .stdout(predicate::str::contains("Level 2"))
        .stdout(predicate::str::contains("snet (subnet) ← net, vnet"));
}

#[test]
fn test_up_requires_yes() {
    let project = TestProject::new();
    project.write_stack_kdl(NETWORK);

    project
        .infra()
        .arg("up")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 to create"))
        .stdout(predicate::str::contains("Pass --yes"));
    assert!(!project.state_file().exists());
}

#[test]
fn test_lifecycle() {
    let project = TestProject::new();
    project.write_stack_kdl(NETWORK);

    project
        .infra()
        .args(["up", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply complete"))
        .stdout(predicate::str::contains(
            "url = http://network-test.westeurope.cloudapp.local/",
        ));
    assert!(project.state_file().exists());

    let output = project
        .infra()
        .args(["outputs", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let outputs: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        outputs["url"],
        serde_json::json!("http://network-test.westeurope.cloudapp.local/")
    );

    // re-apply is a no-op
    project
        .infra()
        .args(["up", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    // removing the public IP (and its output) deletes exactly that resource
    let reduced = NETWORK
        .split("public_ip \"ip\"")
        .next()
        .unwrap()
        .to_string();
    project.write_stack_kdl(&reduced);
    project
        .infra()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 to create, 0 to update, 0 to replace, 1 to delete"));
    project
        .infra()
        .args(["up", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delete public_ip 'ip'"));

    project
        .infra()
        .args(["destroy", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Destroy complete"));
    project
        .infra()
        .arg("destroy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn test_custom_state_dir() {
    let project = TestProject::new();
    project.write_stack_kdl(NETWORK);
    let state_dir = project.path().join("custom-state");

    project
        .infra()
        .env("INFRA_STATE_DIR", &state_dir)
        .args(["up", "--yes"])
        .assert()
        .success();

    assert!(state_dir.join("state.json").exists());
    assert!(state_dir.join("local-cloud.json").exists());
    assert!(!project.state_file().exists());
}

#[test]
fn test_resources_directory_is_merged() {
    let project = TestProject::new();
    project.write_stack_kdl(
        r#"
stack "split"

resource_group "app" {
    name "app"
}
"#,
    );
    project.write_resource_file(
        "registry",
        r#"
container_registry "acr" {
    name "AcrSplit"
    resource_group_name "${app.name}"
    sku "Basic"
}

output "login_server" "${acr.login_server}"
"#,
    );

    project
        .infra()
        .args(["up", "--yes", "--parallelism", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login_server = acrsplit.registry.local"));
}

#[test]
fn test_full_gateway_stack() {
    let project = TestProject::new();
    project.write_stack_kdl(ACI_GATEWAY);

    project
        .infra()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("11 to create"));

    project
        .infra()
        .args(["up", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("application_url = application"))
        .stdout(predicate::str::contains(".westeurope.cloudapp.local"));

    project
        .infra()
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("application_url"));

    project
        .infra()
        .args(["destroy", "--yes"])
        .assert()
        .success();
}
