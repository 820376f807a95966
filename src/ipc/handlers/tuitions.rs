use serde_json::json;

use crate::db;
use crate::format::{display_discounts, format_currency};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_str;
use crate::ipc::types::{AppState, Request};

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match db::tuition_rows(conn) {
        Ok(rows) => ok(&req.id, json!({ "tuitions": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// One enrollment's financial summary, amounts pre-formatted for display.
fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let enrollment_id = match require_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let rows = match db::tuition_rows(conn) {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(row) = rows
        .into_iter()
        .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(enrollment_id.as_str()))
    else {
        return err(
            &req.id,
            "not_found",
            "enrollment not found",
            Some(json!({ "enrollmentId": enrollment_id })),
        );
    };

    let number = |key: &str| row.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
    let discount_types: Vec<String> = row
        .get("discount_types")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Err(e) = db::log_activity(
        conn,
        "Viewed",
        "Tuition",
        &enrollment_id,
        "tuition breakdown viewed",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "tuition": row,
            "display": {
                "totalAmount": format_currency(number("total_amount")),
                "totalPaid": format_currency(number("total_paid")),
                "remainingAmount": format_currency(number("remaining_amount")),
                "discounts": display_discounts(&discount_types),
            },
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tuitions.list" => Some(handle_list(state, req)),
        "tuitions.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
