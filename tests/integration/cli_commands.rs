//! End-to-end tests of the binary

use assert_cmd::Command;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn mirror_cmd(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cloud-asset-mirror").unwrap();
    // No inherited credentials and no stray .env file
    cmd.env_clear().current_dir(workdir.path());
    cmd
}

/// Serve a one-page listing and the single file it names until dropped
async fn spawn_library_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request).into_owned();
                let body = if head.starts_with("GET /v1_1/demo/resources/image") {
                    format!(
                        r#"{{"resources":[{{"public_id":"cat","format":"png","secure_url":"http://{addr}/files/cat.png","asset_folder":"pets"}}]}}"#
                    )
                } else {
                    "meow".to_string()
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

#[test]
fn test_run_without_credentials_fails_before_any_request() {
    let workdir = TempDir::new().unwrap();

    let output = mirror_cmd(&workdir).arg("run").output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CLOUD_NAME"), "stderr was: {stderr}");
    assert!(!workdir.path().join(".mirror-state").exists());
}

#[test]
fn test_status_of_missing_store() {
    let workdir = TempDir::new().unwrap();

    let output = mirror_cmd(&workdir).arg("status").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Enumeration: not started"));
}

#[test]
fn test_reset_without_store_is_noop() {
    let workdir = TempDir::new().unwrap();

    mirror_cmd(&workdir).arg("reset").assert().success();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_mirrors_library_then_status_and_reset() {
    let addr = spawn_library_server().await;
    let workdir = TempDir::new().unwrap();
    let state_dir = workdir.path().join("state");
    let root = workdir.path().join("out");

    let run = {
        let mut cmd = mirror_cmd(&workdir);
        cmd.env("CLOUD_NAME", "demo")
            .env("API_KEY", "key")
            .env("API_SECRET", "secret")
            .env("CLOUDINARY_API_BASE", format!("http://{addr}"))
            .args(["--state-dir", state_dir.to_str().unwrap()])
            .args(["run", "--no-progress", "--download-root", root.to_str().unwrap()]);
        cmd
    };
    let output = tokio::task::spawn_blocking(move || {
        let mut run = run;
        run.output().unwrap()
    })
    .await
    .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(std::fs::read(root.join("pets/cat.png")).unwrap(), b"meow");
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 downloaded"));

    let status = mirror_cmd(&workdir)
        .args(["--state-dir", state_dir.to_str().unwrap(), "--output-format", "json", "status"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(value["resources"], 1);
    assert_eq!(value["pagination"]["complete"], true);

    mirror_cmd(&workdir)
        .args(["--state-dir", state_dir.to_str().unwrap(), "reset"])
        .assert()
        .success();
    assert!(!state_dir.exists());
}
