use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{opt_i64, opt_str};
use crate::ipc::types::{AppState, Request};

/// Recent activity entries, newest first, optionally narrowed by entity
/// type, entity id or action.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut sql = String::from(
        "SELECT id, action, entity_type, entity_id, details, user, timestamp
         FROM activity_log WHERE 1=1",
    );
    let mut args: Vec<String> = Vec::new();
    for (param, column) in [
        ("entityType", "entity_type"),
        ("entityId", "entity_id"),
        ("action", "action"),
    ] {
        let value = opt_str(&req.params, param);
        if !value.is_empty() {
            sql.push_str(&format!(" AND {column} = ?"));
            args.push(value);
        }
    }
    sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
    let limit = opt_i64(&req.params, "limit", 50).max(1);

    let entries = conn.prepare(&sql).and_then(|mut stmt| {
        let mut params: Vec<&dyn rusqlite::ToSql> =
            args.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        params.push(&limit);
        stmt.query_map(params.as_slice(), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "action": row.get::<_, String>(1)?,
                "entityType": row.get::<_, String>(2)?,
                "entityId": row.get::<_, String>(3)?,
                "details": row.get::<_, String>(4)?,
                "user": row.get::<_, String>(5)?,
                "timestamp": row.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    });

    match entries {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activity.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
