use serde_json::Value;

use crate::ipc::error::HandlerErr;

pub const GENDERS: [&str; 2] = ["Male", "Female"];
pub const PAYMENT_METHODS: [&str; 3] = ["cash", "g-cash", "bank"];
pub const DISCOUNT_TYPES: [&str; 4] = ["rank_1", "sibling", "full_year", "scholar"];
pub const OTHER_CATEGORIES: [&str; 10] = [
    "enrollment_fee",
    "misc_fee",
    "pta_fee",
    "lms_fee",
    "id",
    "patch",
    "pe_shirt",
    "pe_pants",
    "carpool",
    "others",
];

pub fn require_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

pub fn opt_str(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn opt_f64(params: &Value, key: &str) -> f64 {
    match params.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn opt_i64(params: &Value, key: &str, default: i64) -> i64 {
    params.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

pub fn str_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn validate_one_of(value: &str, allowed: &[&str], what: &str) -> Result<(), HandlerErr> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(HandlerErr {
            code: "bad_params",
            message: format!("{what} must be one of: {}", allowed.join(", ")),
            details: Some(serde_json::json!({ what: value })),
        })
    }
}
