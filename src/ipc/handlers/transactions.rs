use serde_json::json;

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

/// Merged ledger of tuition and other-payment invoices, newest first.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match db::transaction_rows(conn) {
        Ok(rows) => ok(&req.id, json!({ "transactions": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "transactions.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
