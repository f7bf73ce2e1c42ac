use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_ish") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "ish.exe" } else { "ish" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve ish binary path for integration test"),
    }
}

/// Write a config file under `dir` whose data root and log paths all live
/// inside `dir`.
pub fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("ish.toml");
    let body = format!(
        "[harness]\ndata_root = \"data\"\nsettle_interval_ms = 0\n\n\
         [sut]\nbackend = \"memory\"\n\n\
         [paths]\njsonl_log = \"{}\"\nsqlite_db = \"{}\"\n",
        dir.join("activity.jsonl").display(),
        dir.join("activity.sqlite3").display(),
    );
    fs::write(&path, body).expect("write test config");
    path
}

/// Write one scenario file at `dir/data/<rel>`.
pub fn write_scenario(dir: &Path, rel: &str, body: &str) {
    let path = dir.join("data").join(rel);
    fs::create_dir_all(path.parent().expect("scenario parent")).expect("create scenario dir");
    fs::write(path, body).expect("write scenario");
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("ish-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("ISH_OUTPUT_FORMAT", "human")
        .env("NO_COLOR", "1")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute ish command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
