use std::collections::HashSet;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn ipam(data_dir: &Path, args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ipam"));
    command
        .args(args)
        .env("IPAM_DATA_DIR", data_dir)
        .env("IPAM_CONFIG", data_dir.join("absent.toml"))
        .env_remove("RUST_LOG");
    command
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    ipam(data_dir, args).output().expect("Failed to run ipam")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn network_lifecycle() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    let created = run(root, &["create-network", "lan", "10.0.0.0/30"]);
    assert!(created.status.success());
    assert_eq!(stdout(&created), "Network created\n");

    assert_eq!(stdout(&run(root, &["allocate-address", "lan", "a"])), "10.0.0.1\n");
    assert_eq!(stdout(&run(root, &["allocate-address", "lan", "b"])), "10.0.0.2\n");

    let exhausted = run(root, &["allocate-address", "lan", "c"]);
    assert_eq!(exhausted.status.code(), Some(1));
    assert!(exhausted.stdout.is_empty());
    assert!(String::from_utf8_lossy(&exhausted.stderr).contains("no free address left in 'lan'"));

    assert!(root.join("network-lan.json").is_file());
    assert!(root.join("network-lan.lock").is_file());
}

#[test]
fn failures_exit_non_zero_with_a_reason() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    let missing = run(root, &["list-ports", "nowhere"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("host 'nowhere' not found"));

    let usage = run(root, &["create-host", "edge", "8000"]);
    assert_eq!(usage.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&usage.stderr)
        .contains("Usage: ipam create-host <host-id> <start-port> <end-port>"));

    let unknown = run(root, &["frobnicate"]);
    assert_eq!(unknown.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("HOST MANAGEMENT"));

    let help = run(root, &["help"]);
    assert!(help.status.success());
    assert!(stdout(&help).contains("allocate-port <host-id> <port-id>"));
}

#[test]
fn concurrent_processes_never_share_a_port() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let capacity = 12;

    let created = run(root, &["create-host", "shared", "30000", "30011"]);
    assert!(created.status.success());

    let children: Vec<_> = (0..=capacity)
        .map(|i| {
            ipam(root, &["allocate-port", "shared", &format!("svc-{}", i)])
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .expect("Failed to spawn ipam")
        })
        .collect();

    let mut ports = HashSet::new();
    let mut failures = Vec::new();
    for child in children {
        let output = child.wait_with_output().expect("Failed to wait for ipam");
        if output.status.success() {
            let port: u16 = stdout(&output).trim().parse().expect("port on stdout");
            assert!((30000..=30011).contains(&port));
            assert!(ports.insert(port), "port {} handed out twice", port);
        } else {
            failures.push(String::from_utf8_lossy(&output.stderr).into_owned());
        }
    }

    assert_eq!(ports.len(), capacity);
    assert_eq!(failures.len(), 1, "{:?}", failures);
    assert!(failures[0].contains("no free port left in 'shared'"));

    let listed = stdout(&run(root, &["list-ports", "shared"]));
    assert_eq!(listed.lines().count(), capacity);
}
