use rusqlite::Connection;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::format::format_full_name;
use crate::table::Record;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            suffix TEXT,
            gender TEXT NOT NULL,
            birthdate TEXT,
            address TEXT,
            mother_name TEXT,
            mother_job TEXT,
            mother_education TEXT,
            father_name TEXT,
            father_job TEXT,
            father_education TEXT,
            contact_numbers TEXT NOT NULL DEFAULT '[]',
            living_with TEXT,
            created_at TEXT,
            updated_at TEXT,
            deleted_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            type TEXT NOT NULL,
            school_year TEXT NOT NULL,
            grade_level TEXT NOT NULL,
            months INTEGER NOT NULL DEFAULT 10,
            monthly_tuition REAL NOT NULL DEFAULT 0,
            enrollment_fee REAL NOT NULL DEFAULT 0,
            misc_fee REAL NOT NULL DEFAULT 0,
            pta_fee REAL NOT NULL DEFAULT 0,
            lms_books_fee REAL NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT,
            deleted_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS discounts(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            type TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            created_at TEXT,
            deleted_at TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_discounts_enrollment ON discounts(enrollment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tuition_payments(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            invoice_number TEXT NOT NULL,
            reservation_fee REAL NOT NULL DEFAULT 0,
            tuition_fee REAL NOT NULL DEFAULT 0,
            advance_payment REAL NOT NULL DEFAULT 0,
            payment_method TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT,
            deleted_at TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tuition_payments_enrollment
         ON tuition_payments(enrollment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS other_invoices(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            invoice_number TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT,
            deleted_at TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS other_invoice_items(
            id TEXT PRIMARY KEY,
            invoice_id TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            remarks TEXT,
            deleted_at TEXT,
            FOREIGN KEY(invoice_id) REFERENCES other_invoices(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_other_invoice_items_invoice
         ON other_invoice_items(invoice_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_log(
            id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            details TEXT NOT NULL,
            user TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_log_entity
         ON activity_log(entity_type, entity_id)",
        [],
    )?;

    Ok(conn)
}

pub fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn log_activity(
    conn: &Connection,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: &str,
    user: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO activity_log(id, action, entity_type, entity_id, details, user, timestamp)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            uuid::Uuid::new_v4().to_string(),
            action,
            entity_type,
            entity_id,
            details,
            user,
            now_utc(),
        ),
    )?;
    Ok(())
}

fn parse_string_list(raw: &str) -> Vec<Value> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .into_iter()
        .map(Value::String)
        .collect()
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Roster of live students shaped for the students table view.
pub fn student_rows(conn: &Connection) -> anyhow::Result<Vec<Record>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, COALESCE(middle_name, ''), last_name, COALESCE(suffix, ''),
                gender, COALESCE(birthdate, ''), COALESCE(address, ''),
                contact_numbers, COALESCE(living_with, '')
         FROM students
         WHERE deleted_at IS NULL
         ORDER BY last_name, first_name",
    )?;

    let rows = stmt.query_map([], |row| {
        let first: String = row.get(1)?;
        let middle: String = row.get(2)?;
        let last: String = row.get(3)?;
        let suffix: String = row.get(4)?;
        let contact_raw: String = row.get(8)?;

        let mut record = Record::new();
        record.insert("id".into(), Value::String(row.get::<_, String>(0)?));
        record.insert(
            "full_name".into(),
            Value::String(format_full_name(&first, &middle, &last, &suffix)),
        );
        record.insert("first_name".into(), Value::String(first));
        record.insert("middle_name".into(), Value::String(middle));
        record.insert("last_name".into(), Value::String(last));
        record.insert("suffix".into(), Value::String(suffix));
        record.insert("gender".into(), Value::String(row.get::<_, String>(5)?));
        record.insert("birthdate".into(), Value::String(row.get::<_, String>(6)?));
        record.insert("address".into(), Value::String(row.get::<_, String>(7)?));
        record.insert(
            "contact_numbers".into(),
            Value::Array(parse_string_list(&contact_raw)),
        );
        record.insert(
            "living_with".into(),
            Value::String(row.get::<_, String>(9)?),
        );
        Ok(record)
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Discount type lists and summed amounts keyed by enrollment.
fn discount_index(conn: &Connection) -> anyhow::Result<HashMap<String, (Vec<String>, f64)>> {
    let mut stmt =
        conn.prepare("SELECT enrollment_id, type, amount FROM discounts WHERE deleted_at IS NULL")?;
    let mut index: HashMap<String, (Vec<String>, f64)> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (enrollment_id, kind, amount) = row?;
        let entry = index.entry(enrollment_id).or_default();
        if !entry.0.contains(&kind) {
            entry.0.push(kind);
        }
        entry.1 += amount;
    }
    Ok(index)
}

/// Paid totals (reservation + tuition + advance) keyed by enrollment.
fn paid_index(conn: &Connection) -> anyhow::Result<HashMap<String, f64>> {
    let mut stmt = conn.prepare(
        "SELECT enrollment_id,
                COALESCE(SUM(reservation_fee + tuition_fee + advance_payment), 0)
         FROM tuition_payments
         WHERE deleted_at IS NULL
         GROUP BY enrollment_id",
    )?;
    let mut index = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;
    for row in rows {
        let (enrollment_id, paid) = row?;
        index.insert(enrollment_id, paid);
    }
    Ok(index)
}

pub fn payment_status(total_paid: f64, total_amount: f64) -> &'static str {
    if total_paid <= 0.0 {
        "unpaid"
    } else if total_paid >= total_amount {
        "paid"
    } else {
        "partial"
    }
}

/// Financial roll-up per live enrollment: gross fees minus discounts, paid
/// total and remaining balance, plus the derived payment status.
pub fn tuition_rows(conn: &Connection) -> anyhow::Result<Vec<Record>> {
    let discounts = discount_index(conn)?;
    let paid = paid_index(conn)?;

    let mut stmt = conn.prepare(
        "SELECT e.id, s.first_name, COALESCE(s.middle_name, ''), s.last_name,
                COALESCE(s.suffix, ''), s.gender, COALESCE(s.birthdate, ''),
                e.type, e.school_year, e.grade_level,
                e.months, e.monthly_tuition, e.enrollment_fee, e.misc_fee,
                e.pta_fee, e.lms_books_fee
         FROM enrollments e
         JOIN students s ON s.id = e.student_id AND s.deleted_at IS NULL
         WHERE e.deleted_at IS NULL
         ORDER BY e.created_at DESC",
    )?;

    let base: Vec<(Record, f64)> = stmt
        .query_map([], |row| {
            let first: String = row.get(1)?;
            let middle: String = row.get(2)?;
            let last: String = row.get(3)?;
            let suffix: String = row.get(4)?;
            let months: i64 = row.get(10)?;
            let monthly: f64 = row.get(11)?;
            let enrollment_fee: f64 = row.get(12)?;
            let misc_fee: f64 = row.get(13)?;
            let pta_fee: f64 = row.get(14)?;
            let lms_fee: f64 = row.get(15)?;

            let mut record = Record::new();
            record.insert("id".into(), Value::String(row.get::<_, String>(0)?));
            record.insert(
                "full_name".into(),
                Value::String(format_full_name(&first, &middle, &last, &suffix)),
            );
            record.insert("gender".into(), Value::String(row.get::<_, String>(5)?));
            record.insert("birthdate".into(), Value::String(row.get::<_, String>(6)?));
            record.insert("type".into(), Value::String(row.get::<_, String>(7)?));
            record.insert(
                "school_year".into(),
                Value::String(row.get::<_, String>(8)?),
            );
            record.insert(
                "grade_level".into(),
                Value::String(row.get::<_, String>(9)?),
            );
            let gross = monthly * months as f64 + enrollment_fee + misc_fee + pta_fee + lms_fee;
            Ok((record, gross))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(base.len());
    for (mut record, gross) in base {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let (types, discount_total) = discounts.get(&id).cloned().unwrap_or_default();
        let total_amount = gross - discount_total;
        let total_paid = paid.get(&id).copied().unwrap_or(0.0);

        record.insert(
            "discount_types".into(),
            Value::Array(types.into_iter().map(Value::String).collect()),
        );
        record.insert("total_amount".into(), json_number(total_amount));
        record.insert("total_paid".into(), json_number(total_paid));
        record.insert(
            "remaining_amount".into(),
            json_number(total_amount - total_paid),
        );
        record.insert(
            "payment_status".into(),
            Value::String(payment_status(total_paid, total_amount).to_string()),
        );
        out.push(record);
    }
    Ok(out)
}

/// Union of tuition invoices and other invoices, newest first, one row per
/// invoice with its distinct category list and summed amount.
pub fn transaction_rows(conn: &Connection) -> anyhow::Result<Vec<Record>> {
    let mut out = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT tp.id, tp.invoice_number,
                s.first_name, COALESCE(s.middle_name, ''), s.last_name, COALESCE(s.suffix, ''),
                tp.reservation_fee, tp.tuition_fee, tp.advance_payment,
                tp.payment_date, tp.payment_method
         FROM tuition_payments tp
         JOIN enrollments e ON e.id = tp.enrollment_id AND e.deleted_at IS NULL
         JOIN students s ON s.id = e.student_id AND s.deleted_at IS NULL
         WHERE tp.deleted_at IS NULL",
    )?;
    let rows = stmt.query_map([], |row| {
        let reservation: f64 = row.get(6)?;
        let tuition: f64 = row.get(7)?;
        let advance: f64 = row.get(8)?;

        let mut categories = Vec::new();
        if reservation > 0.0 {
            categories.push(Value::String("reservation_fee".to_string()));
        }
        if tuition > 0.0 {
            categories.push(Value::String("tuition_fee".to_string()));
        }
        if advance > 0.0 {
            categories.push(Value::String("advance_payment".to_string()));
        }

        let mut record = Record::new();
        record.insert("id".into(), Value::String(row.get::<_, String>(0)?));
        record.insert(
            "invoice_number".into(),
            Value::String(row.get::<_, String>(1)?),
        );
        record.insert(
            "full_name".into(),
            Value::String(format_full_name(
                &row.get::<_, String>(2)?,
                &row.get::<_, String>(3)?,
                &row.get::<_, String>(4)?,
                &row.get::<_, String>(5)?,
            )),
        );
        record.insert("category".into(), Value::Array(categories));
        record.insert(
            "payment_date".into(),
            Value::String(row.get::<_, String>(9)?),
        );
        record.insert(
            "amount".into(),
            json_number(reservation + tuition + advance),
        );
        record.insert(
            "payment_method".into(),
            Value::String(row.get::<_, String>(10)?),
        );
        Ok(record)
    })?;
    for row in rows {
        out.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT oi.id, oi.invoice_number,
                s.first_name, COALESCE(s.middle_name, ''), s.last_name, COALESCE(s.suffix, ''),
                oi.payment_date, oi.payment_method
         FROM other_invoices oi
         JOIN enrollments e ON e.id = oi.enrollment_id AND e.deleted_at IS NULL
         JOIN students s ON s.id = e.student_id AND s.deleted_at IS NULL
         WHERE oi.deleted_at IS NULL",
    )?;
    let invoices: Vec<(String, Record)> = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let mut record = Record::new();
            record.insert("id".into(), Value::String(id.clone()));
            record.insert(
                "invoice_number".into(),
                Value::String(row.get::<_, String>(1)?),
            );
            record.insert(
                "full_name".into(),
                Value::String(format_full_name(
                    &row.get::<_, String>(2)?,
                    &row.get::<_, String>(3)?,
                    &row.get::<_, String>(4)?,
                    &row.get::<_, String>(5)?,
                )),
            );
            record.insert(
                "payment_date".into(),
                Value::String(row.get::<_, String>(6)?),
            );
            record.insert(
                "payment_method".into(),
                Value::String(row.get::<_, String>(7)?),
            );
            Ok((id, record))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut item_stmt = conn.prepare(
        "SELECT category, amount FROM other_invoice_items
         WHERE invoice_id = ? AND deleted_at IS NULL
         ORDER BY category",
    )?;
    for (invoice_id, mut record) in invoices {
        let items = item_stmt.query_map([&invoice_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut categories: Vec<Value> = Vec::new();
        let mut amount = 0.0;
        for item in items {
            let (category, item_amount) = item?;
            let value = Value::String(category);
            if !categories.contains(&value) {
                categories.push(value);
            }
            amount += item_amount;
        }
        record.insert("category".into(), Value::Array(categories));
        record.insert("amount".into(), json_number(amount));
        out.push(record);
    }

    // Newest first, invoice number breaking ties, matching the ledger view.
    out.sort_by(|a, b| {
        let key = |r: &Record| {
            (
                r.get("payment_date")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                r.get("invoice_number")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            )
        };
        key(b).cmp(&key(a))
    });
    Ok(out)
}
