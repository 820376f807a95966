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

fn request(
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        id,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("missing code")
}

fn header_index(view: &serde_json::Value, column_id: &str) -> usize {
    view.get("headers")
        .and_then(|v| v.as_array())
        .expect("headers")
        .iter()
        .position(|h| h.get("id").and_then(|v| v.as_str()) == Some(column_id))
        .unwrap_or_else(|| panic!("column {} not visible", column_id))
}

fn cell(view: &serde_json::Value, row: usize, column_id: &str) -> String {
    let idx = header_index(view, column_id);
    view.get("rows")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.get(row))
        .and_then(|r| r.get("cells"))
        .and_then(|c| c.as_array())
        .and_then(|c| c.get(idx))
        .and_then(|v| v.as_str())
        .expect("cell value")
        .to_string()
}

#[test]
fn payments_merge_into_the_transaction_ledger() {
    let workspace = temp_dir("registrar-transactions");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let enrolled = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "enrollments.createNew",
        json!({
            "student": { "firstName": "Maria", "lastName": "Clara", "gender": "Female" },
            "schoolYear": "2024-2025",
            "gradeLevel": "kinder-1",
            "monthlyTuition": 1000
        }),
    );
    let enrollment_id = enrolled
        .get("enrollmentId")
        .and_then(|v| v.as_str())
        .expect("enrollmentId")
        .to_string();

    // Tuition payment split across reservation and tuition.
    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.tuition",
        json!({
            "enrollmentId": enrollment_id,
            "invoiceNumber": "OR-0002",
            "reservationFee": 2000,
            "tuitionFee": 1000,
            "paymentMethod": "cash",
            "paymentDate": "2025-06-15"
        }),
    );
    assert_eq!(paid.get("amount").and_then(|v| v.as_f64()), Some(3000.0));

    // Unknown payment methods and zero-amount payments are rejected.
    let bad = request(
        &mut stdin,
        &mut reader,
        "4",
        "payments.tuition",
        json!({
            "enrollmentId": enrollment_id,
            "invoiceNumber": "OR-XXXX",
            "tuitionFee": 100,
            "paymentMethod": "check",
            "paymentDate": "2025-06-15"
        }),
    );
    assert_eq!(error_code(&bad), "bad_params");
    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "payments.tuition",
        json!({
            "enrollmentId": enrollment_id,
            "invoiceNumber": "OR-XXXX",
            "paymentMethod": "cash",
            "paymentDate": "2025-06-15"
        }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    // "others" items carry their own remarks.
    let bad = request(
        &mut stdin,
        &mut reader,
        "6",
        "payments.other",
        json!({
            "enrollmentId": enrollment_id,
            "invoiceNumber": "OR-XXXX",
            "paymentMethod": "g-cash",
            "paymentDate": "2025-06-20",
            "items": [{ "category": "others", "amount": 100 }]
        }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "payments.other",
        json!({
            "enrollmentId": enrollment_id,
            "invoiceNumber": "OR-0003",
            "paymentMethod": "g-cash",
            "paymentDate": "2025-06-20",
            "items": [
                { "category": "id", "amount": 150 },
                { "category": "pe_shirt", "amount": 350 },
                { "category": "others", "amount": 100, "remarks": "school fair raffle" }
            ]
        }),
    );
    assert_eq!(other.get("amount").and_then(|v| v.as_f64()), Some(600.0));

    // Both ledgers, newest invoice first.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "transactions.list",
        json!({}),
    );
    let rows = listed
        .get("transactions")
        .and_then(|v| v.as_array())
        .expect("transactions");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("invoice_number").and_then(|v| v.as_str()),
        Some("OR-0003")
    );
    assert_eq!(
        rows[0].get("category"),
        Some(&json!(["id", "others", "pe_shirt"]))
    );
    assert_eq!(
        rows[1].get("category"),
        Some(&json!(["reservation_fee", "tuition_fee"]))
    );

    // Rendered ledger: labeled categories, formatted cells, amount footer.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "table.query",
        json!({ "entity": "transactions", "state": {} }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(cell(&view, 0, "invoice_number"), "OR-0003");
    assert_eq!(cell(&view, 0, "full_name"), "Maria Clara");
    assert_eq!(cell(&view, 0, "category"), "ID, Others, PE Shirt");
    assert_eq!(cell(&view, 0, "payment_date"), "06/20/2025");
    assert_eq!(cell(&view, 0, "amount"), "₱600.00");
    assert_eq!(cell(&view, 0, "payment_method"), "GCash");
    assert_eq!(cell(&view, 1, "category"), "Reservation Fee, Tuition Fee");
    assert_eq!(cell(&view, 1, "amount"), "₱3,000.00");
    assert_eq!(cell(&view, 1, "payment_method"), "Cash");

    let footer = view
        .get("footer")
        .and_then(|v| v.as_array())
        .expect("footer present");
    assert_eq!(
        footer[header_index(&view, "amount")].as_str(),
        Some("₱3,600.00")
    );

    // Method filter narrows the ledger and its footer.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "table.query",
        json!({
            "entity": "transactions",
            "state": {
                "columnFilters": [{ "column": "payment_method", "values": ["Cash"] }]
            }
        }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(1));
    let footer = view
        .get("footer")
        .and_then(|v| v.as_array())
        .expect("footer present");
    assert_eq!(
        footer[header_index(&view, "amount")].as_str(),
        Some("₱3,000.00")
    );

    // Category filter intersects against the item list.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "table.query",
        json!({
            "entity": "transactions",
            "state": {
                "columnFilters": [{ "column": "category", "values": ["Tuition Fee"] }]
            }
        }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(cell(&view, 0, "invoice_number"), "OR-0002");

    // Per-enrollment payment history.
    let history = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "payments.list",
        json!({ "enrollmentId": enrollment_id }),
    );
    let tuition = history
        .get("tuitionPayments")
        .and_then(|v| v.as_array())
        .expect("tuitionPayments");
    assert_eq!(tuition.len(), 1);
    assert_eq!(tuition[0].get("amount").and_then(|v| v.as_f64()), Some(3000.0));
    let other = history
        .get("otherInvoices")
        .and_then(|v| v.as_array())
        .expect("otherInvoices");
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].get("amount").and_then(|v| v.as_f64()), Some(600.0));

    // Only tuition-ledger money counts toward the balance.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "tuitions.get",
        json!({ "enrollmentId": enrollment_id }),
    );
    let row = summary.get("tuition").expect("tuition row");
    assert_eq!(row.get("total_paid").and_then(|v| v.as_f64()), Some(3000.0));
    assert_eq!(
        row.get("remaining_amount").and_then(|v| v.as_f64()),
        Some(7000.0)
    );
    assert_eq!(
        row.get("payment_status").and_then(|v| v.as_str()),
        Some("partial")
    );

    // The tuition table reflects the same status.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "table.query",
        json!({
            "entity": "tuitions",
            "state": {
                "columnFilters": [{ "column": "payment_status", "values": ["Partial"] }]
            }
        }),
    );
    assert_eq!(view.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(cell(&view, 0, "remaining_amount"), "₱7,000.00");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
