mod calc;
mod db;
mod error;
mod forecast;
mod groups;
mod import;
mod ipc;
mod report;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

fn init_logging() {
    let env = env_logger::Env::new().filter_or("GRADEBOOKD_LOG", "warn");
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() {
    init_logging();
    let mut state = ipc::AppState::default();

    if let Some(path) = std::env::var_os("GRADEBOOKD_WORKSPACE") {
        if let Err(e) = state.open_workspace(PathBuf::from(&path)) {
            log::error!("cannot open workspace {}: {:?}", path.to_string_lossy(), e);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                log::error!("unreadable request: {}", e);
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(stdout, "{}", resp);
        let _ = stdout.flush();
    }
}
