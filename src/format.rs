use chrono::NaiveDate;

/// Zero value the backend emits for unset timestamps.
const ZERO_DATE: &str = "0001-01-01T00:00:00Z";

pub const NOT_SPECIFIED: &str = "Not specified";

pub fn capital_first_letter(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// First name, abbreviated middle initial, last name and suffix, skipping
/// whichever parts are blank: "Jose P. Rizal Jr".
pub fn format_full_name(first: &str, middle: &str, last: &str, suffix: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);
    if !first.trim().is_empty() {
        parts.push(first.trim().to_string());
    }
    if let Some(initial) = middle.trim().chars().next() {
        parts.push(format!("{}.", initial));
    }
    if !last.trim().is_empty() {
        parts.push(last.trim().to_string());
    }
    if !suffix.trim().is_empty() {
        parts.push(suffix.trim().to_string());
    }
    parts.join(" ")
}

/// Peso display used by body cells and footer sums alike: "₱12,345.50".
/// Negative amounts keep the sign ahead of the symbol.
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if negative {
        format!("-₱{}.{:02}", grouped, frac)
    } else {
        format!("₱{}.{:02}", grouped, frac)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() || value == ZERO_DATE {
        return None;
    }
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// "March 4, 2018"; unset or unparseable dates display as "N/A".
pub fn format_birthdate(value: &str) -> String {
    match parse_date(value) {
        Some(d) => d.format("%B %-d, %Y").to_string(),
        None => "N/A".to_string(),
    }
}

/// "03/04/2018" for compact table cells; blank when unset.
pub fn format_short_date(value: &str) -> String {
    match parse_date(value) {
        Some(d) => d.format("%m/%d/%Y").to_string(),
        None => String::new(),
    }
}

/// Human label for an enrollment discount code.
pub fn discount_label(code: &str) -> String {
    match code {
        "rank_1" => "Quipper/Books".to_string(),
        "sibling" => "Siblings".to_string(),
        "full_year" => "Full Year".to_string(),
        "scholar" => "Scholar".to_string(),
        other => capital_first_letter(other),
    }
}

/// Joined discount labels; an enrollment without discounts shows "None".
pub fn display_discounts(codes: &[String]) -> String {
    if codes.is_empty() {
        return "None".to_string();
    }
    codes
        .iter()
        .map(|c| discount_label(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human label for an invoice item category code.
pub fn category_label(code: &str) -> String {
    match code {
        "tuition_fee" => "Tuition Fee".to_string(),
        "reservation_fee" => "Reservation Fee".to_string(),
        "advance_payment" => "Advance Payment".to_string(),
        "enrollment_fee" => "Enrollment Fee".to_string(),
        "misc_fee" => "Misc Fee".to_string(),
        "pta_fee" => "PTA Fee".to_string(),
        "lms_fee" => "LMS/Books".to_string(),
        "id" => "ID".to_string(),
        "patch" => "Patch".to_string(),
        "pe_shirt" => "PE Shirt".to_string(),
        "pe_pants" => "PE Pants".to_string(),
        "carpool" => "Carpool".to_string(),
        "others" => "Others".to_string(),
        other => capital_first_letter(other),
    }
}

pub fn payment_method_label(code: &str) -> String {
    match code {
        "cash" => "Cash".to_string(),
        "g-cash" => "GCash".to_string(),
        "bank" => "Bank".to_string(),
        other => capital_first_letter(other),
    }
}
