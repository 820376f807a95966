use serde_json::json;

use crate::columns;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_str;
use crate::ipc::types::{AppState, Request};
use crate::render;
use crate::table::{Pagination, TableState};

/// Materializes one table page for a display surface: parse the view state,
/// load the entity's rows and run the filter/sort/paginate pipeline.
fn handle_query(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entity = match require_str(&req.params, "entity") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let records = match entity.as_str() {
        "students" => db::student_rows(conn),
        "enrollments" | "tuitions" => db::tuition_rows(conn),
        "transactions" => db::transaction_rows(conn),
        _ => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown entity: {entity}"),
                Some(json!({ "entity": entity })),
            )
        }
    };
    let records = match records {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(cols) = columns::columns_for_entity(&entity) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown entity: {entity}"),
            Some(json!({ "entity": entity })),
        );
    };

    let mut view_state: TableState = req
        .params
        .get("state")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    // A zero page size would render an empty grid over a non-empty set;
    // treat it as malformed input and fall back to the default grid.
    if view_state.pagination.page_size == 0 {
        view_state.pagination = Pagination::default();
    }
    // Entity defaults apply first; explicit toggles from the caller win.
    let mut visibility = columns::default_visibility(&entity);
    visibility.append(&mut view_state.column_visibility);
    view_state.column_visibility = visibility;

    let view = render::render(&cols, &records, &view_state);
    match serde_json::to_value(view) {
        Ok(value) => ok(&req.id, value),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "table.query" => Some(handle_query(state, req)),
        _ => None,
    }
}
