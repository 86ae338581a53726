use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary home with every dotplug root redirected inside it.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    fn write_manifest(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("failed to write manifest");
        path
    }

    fn dot_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_dot");
        let mut cmd = Command::new(bin_path);
        cmd.current_dir(self.root())
            .env("HOME", self.root())
            .env("DOTPLUG_ARCHIVE_ROOT", self.path("archives"))
            .env("DOTPLUG_INSTALL_ROOT", self.path("opt"))
            .env("XDG_BIN_HOME", self.path("bin"))
            .env_remove("DOTPLUG_JOBS")
            .env_remove("DOTPLUG_LOG_DIR")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.dot_cmd().args(args).output().expect("failed to run dot")
    }
}

fn foo_tarball() -> Vec<u8> {
    let body = b"#!/bin/sh\necho foo\n";
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_mode(0o755);
    header.set_size(body.len() as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, "foo-1.0/foo", &body[..])
        .unwrap();
    builder.into_inner().unwrap()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("install"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
}

#[test]
fn test_check_prints_install_order() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.toml",
        r#"
        [[app]]
        name = "tool"
        version = "2.0"
        build = "command"
        depends = ["lib"]

        [[app]]
        name = "lib"
        version = "1.0"
        build = "command"
        "#,
    );

    let output = ctx.run(&["check", manifest.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(rows.len(), 2, "{stdout}");
    assert!(rows[0].contains("lib"), "{stdout}");
    assert!(rows[1].contains("tool"), "{stdout}");
}

#[test]
fn test_check_rejects_cycle() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.json",
        r#"[
            {"name": "a", "version": "1", "build": "command", "depends": ["b"]},
            {"name": "b", "version": "1", "build": "command", "depends": ["a"]}
        ]"#,
    );

    let output = ctx.run(&["check", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cycle"), "{stderr}");
}

#[test]
fn test_install_command_app() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.toml",
        r#"
        [[app]]
        name = "hello"
        version = "1.0"
        build = "command"
        link = { targets = ["hello"] }

        [[app.commands]]
        cmds = ["mkdir -p {dest}/bin", "printf hi > {dest}/bin/hello"]
        "#,
    );

    let output = ctx.run(&["install", manifest.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        std::fs::read_link(ctx.path("bin/hello")).unwrap(),
        ctx.path("opt/hello/1.0/bin/hello")
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RESULT"));

    // The second run finds it installed.
    let output = ctx.run(&["install", manifest.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("already installed"), "{stdout}");
}

#[test]
fn test_install_failure_exits_non_zero() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.toml",
        r#"
        [[app]]
        name = "broken"
        version = "1.0"
        build = "command"

        [[app.commands]]
        cmds = ["exit 3"]

        [[app]]
        name = "after"
        version = "1.0"
        build = "command"
        depends = ["broken"]
        "#,
    );

    let output = ctx.run(&["install", "--quiet", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("2 applications failed"), "{stderr}");
    assert!(!ctx.path("opt/broken/current").exists());
    assert!(!ctx.path("opt/after/1.0").exists());
}

#[test]
fn test_install_downloads_and_links_binary() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/foo-1.0.tar")
        .with_body(foo_tarball())
        .expect(1)
        .create();

    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.toml",
        &format!(
            r#"
            [[app]]
            name = "foo"
            version = "1.0"
            build = "binary"
            type = "tar"
            repo = "{}/foo-{{version}}.{{type}}"
            link = {{ targets = ["foo"] }}
            "#,
            server.url()
        ),
    );

    let output = ctx.run(&["install", "--jobs", "2", manifest.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    mock.assert();

    assert!(ctx.path("archives/foo/foo-1.0.tar").is_file());
    assert_eq!(
        std::fs::read_link(ctx.path("bin/foo")).unwrap(),
        ctx.path("opt/foo/1.0/foo")
    );
    assert_eq!(
        std::fs::read_link(ctx.path("opt/foo/current")).unwrap(),
        ctx.path("opt/foo/1.0")
    );
}

#[test]
fn test_rejects_zero_jobs() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest("apps.toml", "");
    let output = ctx.run(&["install", "--jobs", "0", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_rejects_zero_timeout() {
    let ctx = TestContext::new();
    let manifest = ctx.write_manifest(
        "apps.toml",
        r#"
        [[app]]
        name = "hello"
        version = "1.0"
        build = "command"
        "#,
    );
    let output = ctx.run(&["install", "--timeout", "0", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--timeout"), "{stderr}");
    assert!(!ctx.path("opt/hello").exists());
}
