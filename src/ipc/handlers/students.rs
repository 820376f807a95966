use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{opt_str, require_str, str_list, validate_one_of, GENDERS};
use crate::ipc::types::{AppState, Request};

fn insert_student(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let first_name = require_str(params, "firstName")?;
    let last_name = require_str(params, "lastName")?;
    let gender = require_str(params, "gender")?;
    validate_one_of(&gender, &GENDERS, "gender")?;

    let id = Uuid::new_v4().to_string();
    let contact_numbers = serde_json::to_string(&str_list(params, "contactNumbers"))
        .unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO students(
            id, first_name, middle_name, last_name, suffix, gender, birthdate, address,
            mother_name, mother_job, mother_education,
            father_name, father_job, father_education,
            contact_numbers, living_with, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            first_name,
            opt_str(params, "middleName"),
            last_name,
            opt_str(params, "suffix"),
            gender,
            opt_str(params, "birthdate"),
            opt_str(params, "address"),
            opt_str(params, "motherName"),
            opt_str(params, "motherJob"),
            opt_str(params, "motherEducation"),
            opt_str(params, "fatherName"),
            opt_str(params, "fatherJob"),
            opt_str(params, "fatherEducation"),
            contact_numbers,
            opt_str(params, "livingWith"),
            db::now_utc(),
            db::now_utc(),
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;
    Ok(id)
}

// enrollments.createNew reuses the same student payload shape.
pub(super) fn create_student_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<String, HandlerErr> {
    insert_student(conn, params)
}

pub(super) fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE id = ? AND deleted_at IS NULL",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    Ok(found.is_some())
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match insert_student(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = db::log_activity(
        conn,
        "Created",
        "Student",
        &student_id,
        "student record created",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match db::student_rows(conn) {
        Ok(rows) => ok(&req.id, json!({ "students": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Compact id/name pairs for the student selector in payment forms.
fn handle_dropdown(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let rows = match db::student_rows(conn) {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let options: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "id": r.get("id").cloned().unwrap_or_default(),
                "fullName": r.get("full_name").cloned().unwrap_or_default(),
            })
        })
        .collect();
    ok(&req.id, json!({ "students": options }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match require_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return e.response(&req.id),
    }

    // Validate before writing so a rejected payload changes nothing.
    if let Some(gender) = req.params.get("gender").and_then(|v| v.as_str()) {
        if let Err(e) = validate_one_of(gender, &GENDERS, "gender") {
            return e.response(&req.id);
        }
    }

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Only the provided fields change; blanks are treated as "leave as-is".
    let updates: [(&str, &str); 14] = [
        ("firstName", "first_name"),
        ("middleName", "middle_name"),
        ("lastName", "last_name"),
        ("suffix", "suffix"),
        ("birthdate", "birthdate"),
        ("address", "address"),
        ("motherName", "mother_name"),
        ("motherJob", "mother_job"),
        ("motherEducation", "mother_education"),
        ("fatherName", "father_name"),
        ("fatherJob", "father_job"),
        ("fatherEducation", "father_education"),
        ("livingWith", "living_with"),
        ("gender", "gender"),
    ];
    for (param, column) in updates {
        let Some(value) = req.params.get(param).and_then(|v| v.as_str()) else {
            continue;
        };
        let sql = format!("UPDATE students SET {column} = ?, updated_at = ? WHERE id = ?");
        if let Err(e) = tx.execute(&sql, rusqlite::params![value, db::now_utc(), student_id]) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    if req.params.get("contactNumbers").is_some() {
        let contact_numbers = serde_json::to_string(&str_list(&req.params, "contactNumbers"))
            .unwrap_or_else(|_| "[]".to_string());
        if let Err(e) = tx.execute(
            "UPDATE students SET contact_numbers = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![contact_numbers, db::now_utc(), student_id],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    if let Err(e) = db::log_activity(
        &tx,
        "Updated",
        "Student",
        &student_id,
        "student record updated",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match require_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let changed = match conn.execute(
        "UPDATE students SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        rusqlite::params![db::now_utc(), student_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    }

    if let Err(e) = db::log_activity(
        conn,
        "Deleted",
        "Student",
        &student_id,
        "student record deleted",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_create(state, req)),
        "students.list" => Some(handle_list(state, req)),
        "students.dropdown" => Some(handle_dropdown(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
