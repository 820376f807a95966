mod columns;
mod db;
mod format;
mod ipc;
mod render;
mod table;

use std::io::{self, BufRead, Write};

fn write_line(out: &mut impl Write, value: &serde_json::Value) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}

fn main() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    // One request per line; every parseable line gets exactly one response.
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
                // No id to echo back for a line that never parsed.
                write_line(
                    &mut stdout,
                    &serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }
}
