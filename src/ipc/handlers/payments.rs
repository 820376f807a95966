use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::enrollments::enrollment_exists;
use crate::ipc::helpers::{
    opt_f64, opt_str, require_str, validate_one_of, OTHER_CATEGORIES, PAYMENT_METHODS,
};
use crate::ipc::types::{AppState, Request};

struct InvoiceHeader {
    enrollment_id: String,
    invoice_number: String,
    payment_method: String,
    payment_date: String,
    notes: String,
}

fn parse_invoice_header(params: &serde_json::Value) -> Result<InvoiceHeader, HandlerErr> {
    let payment_method = require_str(params, "paymentMethod")?;
    validate_one_of(&payment_method, &PAYMENT_METHODS, "payment method")?;
    Ok(InvoiceHeader {
        enrollment_id: require_str(params, "enrollmentId")?,
        invoice_number: require_str(params, "invoiceNumber")?,
        payment_method,
        payment_date: require_str(params, "paymentDate")?,
        notes: opt_str(params, "notes"),
    })
}

/// Tuition payment: one invoice row with reservation/tuition/advance splits.
fn handle_tuition_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let header = match parse_invoice_header(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match enrollment_exists(conn, &header.enrollment_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                "enrollment not found",
                Some(json!({ "enrollmentId": header.enrollment_id })),
            )
        }
        Err(e) => return e.response(&req.id),
    }

    let reservation = opt_f64(&req.params, "reservationFee");
    let tuition = opt_f64(&req.params, "tuitionFee");
    let advance = opt_f64(&req.params, "advancePayment");
    if reservation < 0.0 || tuition < 0.0 || advance < 0.0 {
        return err(&req.id, "bad_params", "negative amounts are not allowed", None);
    }
    let total = reservation + tuition + advance;
    if total <= 0.0 {
        return err(
            &req.id,
            "bad_params",
            "payment amount must be greater than 0",
            None,
        );
    }

    let payment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO tuition_payments(
            id, enrollment_id, invoice_number, reservation_fee, tuition_fee,
            advance_payment, payment_method, payment_date, notes, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            payment_id,
            header.enrollment_id,
            header.invoice_number,
            reservation,
            tuition,
            advance,
            header.payment_method,
            header.payment_date,
            header.notes,
            db::now_utc(),
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    if let Err(e) = db::log_activity(
        conn,
        "Created",
        "Tuition",
        &header.enrollment_id,
        &format!("tuition payment recorded, invoice {}", header.invoice_number),
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "paymentId": payment_id, "amount": total }),
    )
}

struct ItemInput {
    category: String,
    amount: f64,
    remarks: String,
}

fn parse_items(params: &serde_json::Value) -> Result<Vec<ItemInput>, HandlerErr> {
    let Some(arr) = params.get("items").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing items[]"));
    };
    if arr.is_empty() {
        return Err(HandlerErr::bad_params(
            "at least one payment item is required",
        ));
    }

    let mut out = Vec::with_capacity(arr.len());
    for (i, entry) in arr.iter().enumerate() {
        let category = entry
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        validate_one_of(&category, &OTHER_CATEGORIES, "category").map_err(|mut e| {
            e.message = format!("item at index {i}: {}", e.message);
            e
        })?;
        let amount = opt_f64(entry, "amount");
        if amount < 1.0 {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("item at index {i}: amount is required"),
                details: Some(json!({ "amount": amount })),
            });
        }
        let remarks = opt_str(entry, "remarks");
        if category == "others" && remarks.trim().is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "item at index {i}: remarks are required when category is 'others'"
            )));
        }
        out.push(ItemInput {
            category,
            amount,
            remarks,
        });
    }
    Ok(out)
}

/// Non-tuition payment: invoice header plus itemized categories.
fn handle_other_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let header = match parse_invoice_header(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let items = match parse_items(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match enrollment_exists(conn, &header.enrollment_id) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                "enrollment not found",
                Some(json!({ "enrollmentId": header.enrollment_id })),
            )
        }
        Err(e) => return e.response(&req.id),
    }

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let invoice_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO other_invoices(
            id, enrollment_id, invoice_number, payment_method, payment_date, notes, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            invoice_id,
            header.enrollment_id,
            header.invoice_number,
            header.payment_method,
            header.payment_date,
            header.notes,
            db::now_utc(),
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let mut total = 0.0;
    for item in &items {
        total += item.amount;
        if let Err(e) = tx.execute(
            "INSERT INTO other_invoice_items(id, invoice_id, category, amount, remarks)
             VALUES(?, ?, ?, ?, ?)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                invoice_id,
                item.category,
                item.amount,
                item.remarks,
            ],
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    if let Err(e) = db::log_activity(
        &tx,
        "Created",
        "Tuition",
        &header.enrollment_id,
        &format!("other payment recorded, invoice {}", header.invoice_number),
        "Admin User",
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "invoiceId": invoice_id, "amount": total }))
}

/// All payment records against one enrollment, both ledgers.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let enrollment_id = match require_str(&req.params, "enrollmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let tuition = conn
        .prepare(
            "SELECT id, invoice_number, reservation_fee, tuition_fee, advance_payment,
                    payment_method, payment_date, COALESCE(notes, '')
             FROM tuition_payments
             WHERE enrollment_id = ? AND deleted_at IS NULL
             ORDER BY payment_date DESC",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&enrollment_id], |row| {
                let reservation: f64 = row.get(2)?;
                let tuition_fee: f64 = row.get(3)?;
                let advance: f64 = row.get(4)?;
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "invoiceNumber": row.get::<_, String>(1)?,
                    "reservationFee": reservation,
                    "tuitionFee": tuition_fee,
                    "advancePayment": advance,
                    "amount": reservation + tuition_fee + advance,
                    "paymentMethod": row.get::<_, String>(5)?,
                    "paymentDate": row.get::<_, String>(6)?,
                    "notes": row.get::<_, String>(7)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    let tuition = match tuition {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let other = conn
        .prepare(
            "SELECT oi.id, oi.invoice_number, oi.payment_method, oi.payment_date,
                    COALESCE(SUM(oii.amount), 0)
             FROM other_invoices oi
             LEFT JOIN other_invoice_items oii
               ON oii.invoice_id = oi.id AND oii.deleted_at IS NULL
             WHERE oi.enrollment_id = ? AND oi.deleted_at IS NULL
             GROUP BY oi.id, oi.invoice_number, oi.payment_method, oi.payment_date
             ORDER BY oi.payment_date DESC",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&enrollment_id], |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "invoiceNumber": row.get::<_, String>(1)?,
                    "paymentMethod": row.get::<_, String>(2)?,
                    "paymentDate": row.get::<_, String>(3)?,
                    "amount": row.get::<_, f64>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    let other = match other {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({ "tuitionPayments": tuition, "otherInvoices": other }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.tuition" => Some(handle_tuition_payment(state, req)),
        "payments.other" => Some(handle_other_payment(state, req)),
        "payments.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
