use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::students;
use crate::ipc::helpers::{
    opt_f64, opt_i64, require_str, validate_one_of, DISCOUNT_TYPES,
};
use crate::ipc::types::{AppState, Request};
use crate::table::GRADE_LEVEL_ORDER;

const DEFAULT_SCHOOL_MONTHS: i64 = 10;

fn validate_grade_level(grade_level: &str) -> Result<(), HandlerErr> {
    if GRADE_LEVEL_ORDER
        .iter()
        .any(|g| g.eq_ignore_ascii_case(grade_level))
    {
        Ok(())
    } else {
        Err(HandlerErr {
            code: "bad_params",
            message: "unknown grade level".to_string(),
            details: Some(json!({ "gradeLevel": grade_level })),
        })
    }
}

struct DiscountInput {
    kind: String,
    amount: f64,
}

fn parse_discounts(params: &serde_json::Value) -> Result<Vec<DiscountInput>, HandlerErr> {
    let Some(arr) = params.get("discounts").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, entry) in arr.iter().enumerate() {
        let kind = entry
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        validate_one_of(&kind, &DISCOUNT_TYPES, "discount type").map_err(|mut e| {
            e.message = format!("discount at index {i}: {}", e.message);
            e
        })?;
        out.push(DiscountInput {
            kind,
            amount: opt_f64(entry, "amount"),
        });
    }
    Ok(out)
}

fn insert_enrollment(
    conn: &Connection,
    student_id: &str,
    kind: &str,
    params: &serde_json::Value,
) -> Result<String, HandlerErr> {
    let school_year = require_str(params, "schoolYear")?;
    let grade_level = require_str(params, "gradeLevel")?.to_lowercase();
    validate_grade_level(&grade_level)?;
    let discounts = parse_discounts(params)?;

    let enrollment_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(
            id, student_id, type, school_year, grade_level, months,
            monthly_tuition, enrollment_fee, misc_fee, pta_fee, lms_books_fee,
            created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            enrollment_id,
            student_id,
            kind,
            school_year,
            grade_level,
            opt_i64(params, "months", DEFAULT_SCHOOL_MONTHS),
            opt_f64(params, "monthlyTuition"),
            opt_f64(params, "enrollmentFee"),
            opt_f64(params, "miscFee"),
            opt_f64(params, "ptaFee"),
            opt_f64(params, "lmsBooksFee"),
            db::now_utc(),
            db::now_utc(),
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "enrollments" })),
    })?;

    for discount in discounts {
        conn.execute(
            "INSERT INTO discounts(id, enrollment_id, type, amount, created_at)
             VALUES(?, ?, ?, ?, ?)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                enrollment_id,
                discount.kind,
                discount.amount,
                db::now_utc(),
            ],
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "discounts" })),
        })?;
    }
    Ok(enrollment_id)
}

/// New student: student record + enrollment + discounts in one transaction.
fn handle_create_new(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_params) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing params.student", None);
    };

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let student_id = match students::create_student_record(&tx, student_params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let enrollment_id = match insert_enrollment(&tx, &student_id, "new", &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = db::log_activity(
        &tx,
        "Created",
        "Enrollment",
        &enrollment_id,
        "new student enrolled",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "enrollmentId": enrollment_id, "studentId": student_id }),
    )
}

/// Returning student: enrollment against an existing student record.
fn handle_create_existing(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match require_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match students::student_exists(conn, &student_id) {
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

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let enrollment_id = match insert_enrollment(&tx, &student_id, "old", &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = db::log_activity(
        &tx,
        "Created",
        "Enrollment",
        &enrollment_id,
        "returning student enrolled",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "enrollmentId": enrollment_id }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match db::tuition_rows(conn) {
        Ok(rows) => ok(&req.id, json!({ "enrollments": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub(super) fn enrollment_exists(
    conn: &Connection,
    enrollment_id: &str,
) -> Result<bool, HandlerErr> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE id = ? AND deleted_at IS NULL",
            [enrollment_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    Ok(found.is_some())
}

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

    ok(&req.id, json!({ "enrollment": row }))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let enrollment_id = match require_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match enrollment_exists(conn, &enrollment_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                "enrollment not found",
                Some(json!({ "enrollmentId": enrollment_id })),
            )
        }
        Err(e) => return e.response(&req.id),
    }

    // Validate the whole payload before touching any row: a rejected
    // request must leave the enrollment exactly as it was.
    let grade_level = match req.params.get("gradeLevel").and_then(|v| v.as_str()) {
        Some(raw) => {
            let grade_level = raw.to_lowercase();
            if let Err(e) = validate_grade_level(&grade_level) {
                return e.response(&req.id);
            }
            Some(grade_level)
        }
        None => None,
    };
    let discounts = if req.params.get("discounts").is_some() {
        match parse_discounts(&req.params) {
            Ok(v) => Some(v),
            Err(e) => return e.response(&req.id),
        }
    } else {
        None
    };

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(grade_level) = &grade_level {
        if let Err(e) = tx.execute(
            "UPDATE enrollments SET grade_level = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![grade_level, db::now_utc(), enrollment_id],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    if let Some(school_year) = req.params.get("schoolYear").and_then(|v| v.as_str()) {
        if let Err(e) = tx.execute(
            "UPDATE enrollments SET school_year = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![school_year, db::now_utc(), enrollment_id],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    let fee_updates: [(&str, &str); 5] = [
        ("monthlyTuition", "monthly_tuition"),
        ("enrollmentFee", "enrollment_fee"),
        ("miscFee", "misc_fee"),
        ("ptaFee", "pta_fee"),
        ("lmsBooksFee", "lms_books_fee"),
    ];
    for (param, column) in fee_updates {
        if req.params.get(param).is_none() {
            continue;
        }
        let sql = format!("UPDATE enrollments SET {column} = ?, updated_at = ? WHERE id = ?");
        if let Err(e) = tx.execute(
            &sql,
            rusqlite::params![opt_f64(&req.params, param), db::now_utc(), enrollment_id],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    // A provided discounts array replaces the active set.
    if let Some(discounts) = discounts {
        if let Err(e) = tx.execute(
            "UPDATE discounts SET deleted_at = ? WHERE enrollment_id = ? AND deleted_at IS NULL",
            rusqlite::params![db::now_utc(), enrollment_id],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        for discount in discounts {
            if let Err(e) = tx.execute(
                "INSERT INTO discounts(id, enrollment_id, type, amount, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    enrollment_id,
                    discount.kind,
                    discount.amount,
                    db::now_utc(),
                ],
            ) {
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    }

    if let Err(e) = db::log_activity(
        &tx,
        "Updated",
        "Enrollment",
        &enrollment_id,
        "enrollment updated",
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
    let enrollment_id = match require_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let changed = match conn.execute(
        "UPDATE enrollments SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        rusqlite::params![db::now_utc(), enrollment_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(
            &req.id,
            "not_found",
            "enrollment not found",
            Some(json!({ "enrollmentId": enrollment_id })),
        );
    }
    if let Err(e) = conn.execute(
        "UPDATE discounts SET deleted_at = ? WHERE enrollment_id = ? AND deleted_at IS NULL",
        rusqlite::params![db::now_utc(), enrollment_id],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    if let Err(e) = db::log_activity(
        conn,
        "Deleted",
        "Enrollment",
        &enrollment_id,
        "enrollment deleted",
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.createNew" => Some(handle_create_new(state, req)),
        "enrollments.createExisting" => Some(handle_create_existing(state, req)),
        "enrollments.list" => Some(handle_list(state, req)),
        "enrollments.get" => Some(handle_get(state, req)),
        "enrollments.update" => Some(handle_update(state, req)),
        "enrollments.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
