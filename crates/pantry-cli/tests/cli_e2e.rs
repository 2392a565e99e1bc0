use std::fs;
use std::path::Path;
use std::thread;

use assert_cmd::Command;
use insta::assert_snapshot;
use predicates::str::contains;
use tempfile::tempdir;
use tiny_http::{Header, Response, Server, StatusCode};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

fn write_cookbook(root: &Path, name: &str, version: &str) {
    let dir = root.join("cookbooks").join(name);
    write_file(
        &dir.join("metadata.toml"),
        &format!("name = \"{name}\"\nversion = \"{version}\"\nmaintainer = \"Ops\"\n"),
    );
    write_file(&dir.join("recipes/default.rb"), "log 'hello'\n");
}

/// `app -> [users, base]`, `users -> [base]`, `web` standalone.
fn create_project(root: &Path, store_url: &str) {
    for (name, version) in [("app", "1.2.0"), ("users", "0.4.1"), ("base", "2.1.0"), ("web", "0.3.0")] {
        write_cookbook(root, name, version);
    }
    write_file(
        &root.join("Pantry.lock"),
        r#"
dependencies = ["app", "web"]

[[cookbook]]
name = "app"
version = "1.2.0"
path = "cookbooks/app"
dependencies = [{ name = "users", constraint = "~> 0.4" }, { name = "base" }]

[[cookbook]]
name = "users"
version = "0.4.1"
path = "cookbooks/users"
dependencies = [{ name = "base" }]

[[cookbook]]
name = "base"
version = "2.1.0"
path = "cookbooks/base"

[[cookbook]]
name = "web"
version = "0.3.0"
path = "cookbooks/web"
"#,
    );
    write_file(
        &root.join(".pantry.toml"),
        &format!("[store]\nurl = \"{store_url}\"\ntimeout_secs = 5\n"),
    );
}

fn compiled_leftovers(root: &Path) -> Vec<String> {
    ["app", "users", "base", "web"]
        .iter()
        .filter(|n| root.join("cookbooks").join(n).join("metadata.json").exists())
        .map(|n| n.to_string())
        .collect()
}

struct Seen {
    url: String,
    authorization: Option<String>,
}

struct FakeStore {
    base_url: String,
    handle: thread::JoinHandle<Vec<Seen>>,
}

/// Serve exactly `expected_requests` uploads; cookbooks named in `frozen`
/// get a 409.
fn spawn_store(expected_requests: usize, frozen: &'static [&'static str]) -> FakeStore {
    let server = Server::http("127.0.0.1:0").expect("server");
    let base_url = format!("http://{}", server.server_addr());
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..expected_requests {
            let req = server.recv().expect("request");
            let url = req.url().to_string();
            let authorization = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());

            let is_frozen = frozen
                .iter()
                .any(|name| url.starts_with(&format!("/cookbooks/{name}/")));
            let (status, body) = if is_frozen {
                (409, r#"{"error": ["version is frozen"]}"#)
            } else {
                (201, "{}")
            };
            let resp = Response::from_string(body)
                .with_status_code(StatusCode(status))
                .with_header(Header::from_bytes("Content-Type", "application/json").expect("header"));
            req.respond(resp).expect("respond");
            seen.push(Seen { url, authorization });
        }
        seen
    });
    FakeStore { base_url, handle }
}

fn pantry_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pantry"));
    cmd.current_dir(root)
        .env("PANTRY_HOME", root.join(".pantry-home"))
        .env_remove("PANTRY_STORE_TOKEN");
    cmd
}

#[test]
fn plan_prints_dependency_order() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");

    let out = pantry_cmd(td.path()).arg("plan").output().expect("run");
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).expect("utf8");

    assert_snapshot!(stdout, @r"
    1. base@2.1.0
    2. users@0.4.1
    3. app@1.2.0
    4. web@0.3.0
    ");
}

#[test]
fn plan_with_explicit_names_does_not_expand() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");

    pantry_cmd(td.path())
        .args(["plan", "app", "web"])
        .assert()
        .success()
        .stdout("1. app@1.2.0\n2. web@0.3.0\n");
}

#[test]
fn plan_reports_unknown_cookbook() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");

    pantry_cmd(td.path())
        .args(["plan", "ghost"])
        .assert()
        .failure()
        .stderr(contains("cookbook not found in lockfile: ghost"));
}

#[test]
fn upload_sends_every_cookbook_in_order() {
    let td = tempdir().expect("tempdir");
    let store = spawn_store(4, &[]);
    create_project(td.path(), &store.base_url);

    pantry_cmd(td.path())
        .arg("upload")
        .env("PANTRY_STORE_TOKEN", "secret-token")
        .assert()
        .success()
        .stdout(contains("base@2.1.0: uploaded, frozen"))
        .stdout(contains("web@0.3.0: uploaded, frozen"));

    let seen = store.handle.join().expect("join");
    let urls: Vec<&str> = seen.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "/cookbooks/base/2.1.0",
            "/cookbooks/users/0.4.1",
            "/cookbooks/app/1.2.0",
            "/cookbooks/web/0.3.0",
        ]
    );
    assert!(seen
        .iter()
        .all(|s| s.authorization.as_deref() == Some("Bearer secret-token")));
    assert!(compiled_leftovers(td.path()).is_empty());
}

#[test]
fn upload_with_force_and_no_freeze() {
    let td = tempdir().expect("tempdir");
    let store = spawn_store(1, &[]);
    create_project(td.path(), &store.base_url);

    pantry_cmd(td.path())
        .args(["upload", "base", "--force", "--no-freeze"])
        .assert()
        .success()
        .stdout(contains("base@2.1.0: uploaded ("));

    let seen = store.handle.join().expect("join");
    assert_eq!(seen[0].url, "/cookbooks/base/2.1.0?force=true");
    assert!(seen[0].authorization.is_none());
}

#[test]
fn frozen_cookbook_is_skipped_by_default() {
    let td = tempdir().expect("tempdir");
    let store = spawn_store(4, &["users"]);
    create_project(td.path(), &store.base_url);

    pantry_cmd(td.path())
        .arg("upload")
        .assert()
        .success()
        .stdout(contains("users@0.4.1: skipped, already frozen"))
        .stdout(contains("app@1.2.0: uploaded, frozen"))
        .stderr(contains("users@0.4.1: version is frozen on the store; skipping"));

    assert_eq!(store.handle.join().expect("join").len(), 4);
    assert!(compiled_leftovers(td.path()).is_empty());
}

#[test]
fn halt_on_frozen_stops_the_run() {
    let td = tempdir().expect("tempdir");
    let store = spawn_store(2, &["users"]);
    create_project(td.path(), &store.base_url);

    pantry_cmd(td.path())
        .args(["upload", "--halt-on-frozen"])
        .assert()
        .failure()
        .stderr(contains("users@0.4.1: version is already frozen on the store"));

    let seen = store.handle.join().expect("join");
    let urls: Vec<&str> = seen.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, vec!["/cookbooks/base/2.1.0", "/cookbooks/users/0.4.1"]);
    assert!(compiled_leftovers(td.path()).is_empty());
}

#[test]
fn halt_on_frozen_can_come_from_config() {
    let td = tempdir().expect("tempdir");
    let store = spawn_store(1, &["base"]);
    create_project(td.path(), &store.base_url);
    write_file(
        &td.path().join(".pantry.toml"),
        &format!(
            "[store]\nurl = \"{}\"\n\n[upload]\nhalt-on-frozen = true\n",
            store.base_url
        ),
    );

    pantry_cmd(td.path())
        .arg("upload")
        .assert()
        .failure()
        .stderr(contains("base@2.1.0: version is already frozen"));

    assert_eq!(store.handle.join().expect("join").len(), 1);
}

#[test]
fn validation_failure_uploads_nothing() {
    let td = tempdir().expect("tempdir");
    // Nothing listens here; any connection attempt would fail the run differently.
    create_project(td.path(), "http://127.0.0.1:9");
    write_file(&td.path().join("cookbooks/web/attributes.json"), "{ not json");

    pantry_cmd(td.path())
        .arg("upload")
        .assert()
        .failure()
        .stderr(contains("validation failed (1 issue(s))"))
        .stderr(contains("web@0.3.0: attributes.json: invalid JSON"));

    assert!(compiled_leftovers(td.path()).is_empty());
}

#[test]
fn validate_command_reports_success() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");

    pantry_cmd(td.path())
        .args(["validate", "--quiet"])
        .assert()
        .success()
        .stdout("ok: 4 cookbook(s) valid\n")
        .stderr("");
}

#[test]
fn upload_without_store_url_fails() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");
    fs::remove_file(td.path().join(".pantry.toml")).expect("rm");

    pantry_cmd(td.path())
        .arg("upload")
        .assert()
        .failure()
        .stderr(contains("no store URL configured"));
}

#[test]
fn lockfile_flag_overrides_default_location() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");
    fs::rename(td.path().join("Pantry.lock"), td.path().join("other.lock")).expect("rename");

    pantry_cmd(td.path())
        .args(["plan", "--lockfile", "other.lock", "web"])
        .assert()
        .success()
        .stdout("1. web@0.3.0\n");
}

#[test]
fn unknown_upload_option_in_config_is_rejected() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");
    write_file(&td.path().join(".pantry.toml"), "[upload]\nfreeze_all = true\n");

    pantry_cmd(td.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(contains("invalid [upload] section"));
}

#[test]
fn doctor_reports_configuration() {
    let td = tempdir().expect("tempdir");
    create_project(td.path(), "http://127.0.0.1:9");

    pantry_cmd(td.path())
        .arg("doctor")
        .assert()
        .success()
        .stdout(contains("store: http://127.0.0.1:9"))
        .stdout(contains("locked_cookbooks: 4"))
        .stdout(contains("token_detected: false"))
        .stderr(contains("store unreachable"));
}
