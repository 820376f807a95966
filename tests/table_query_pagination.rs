use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn students_table_pages_and_clamps() {
    let workspace = temp_dir("registrar-table-pagination");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for i in 0..25 {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "students.create",
            json!({
                "firstName": "Student",
                "lastName": format!("Row{i:02}"),
                "gender": "Female"
            }),
        );
    }

    // Default state: page size 10, first page.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "table.query",
        json!({ "entity": "students", "state": {} }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(25));
    assert_eq!(view.get("pageCount").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        view.get("rows").and_then(|v| v.as_array()).map(|r| r.len()),
        Some(10)
    );
    assert_eq!(
        view.get("summary").and_then(|v| v.as_str()),
        Some("Showing 1 to 10 of 25 entries")
    );

    // Last page holds the remainder.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "table.query",
        json!({
            "entity": "students",
            "state": { "pagination": { "pageIndex": 2, "pageSize": 10 } }
        }),
    );
    assert_eq!(
        view.get("rows").and_then(|v| v.as_array()).map(|r| r.len()),
        Some(5)
    );
    assert_eq!(
        view.get("summary").and_then(|v| v.as_str()),
        Some("Showing 21 to 25 of 25 entries")
    );

    // Out-of-range index clamps to the last populated page.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "table.query",
        json!({
            "entity": "students",
            "state": { "pagination": { "pageIndex": 7, "pageSize": 10 } }
        }),
    );
    assert_eq!(view.get("pageIndex").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        view.get("rows").and_then(|v| v.as_array()).map(|r| r.len()),
        Some(5)
    );

    // A stale page index survives the filtered set shrinking under it.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "table.query",
        json!({
            "entity": "students",
            "state": {
                "globalFilter": "row24",
                "pagination": { "pageIndex": 2, "pageSize": 10 }
            }
        }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(view.get("pageIndex").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        view.get("summary").and_then(|v| v.as_str()),
        Some("Showing 1 to 1 of 1 entries")
    );

    // Larger page size collapses everything onto one page.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "table.query",
        json!({
            "entity": "students",
            "state": { "pagination": { "pageIndex": 0, "pageSize": 50 } }
        }),
    );
    assert_eq!(view.get("pageCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        view.get("rows").and_then(|v| v.as_array()).map(|r| r.len()),
        Some(25)
    );

    // A zero page size is malformed; the view falls back to the default
    // grid instead of rendering an empty page over a non-empty set.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "table.query",
        json!({
            "entity": "students",
            "state": { "pagination": { "pageIndex": 0, "pageSize": 0 } }
        }),
    );
    assert_eq!(view.get("pageSize").and_then(|v| v.as_u64()), Some(10));
    assert_eq!(view.get("pageCount").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        view.get("rows").and_then(|v| v.as_array()).map(|r| r.len()),
        Some(10)
    );
    assert_eq!(
        view.get("summary").and_then(|v| v.as_str()),
        Some("Showing 1 to 10 of 25 entries")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
