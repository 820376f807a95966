use std::collections::BTreeMap;

use crate::format::{
    capital_first_letter, category_label, discount_label, format_birthdate, format_currency,
    format_short_date, payment_method_label, NOT_SPECIFIED,
};
use crate::table::{Column, ColumnValue, FilterKind, Footer, Header, OptionOrder, Record};

fn text_field(record: &Record, field: &str) -> String {
    record
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn list_field(record: &Record, field: &str) -> Vec<String> {
    record
        .get(field)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number_field(record: &Record, field: &str) -> f64 {
    match record.get(field) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text_or_placeholder(record: &Record, field: &str) -> ColumnValue {
    let value = text_field(record, field);
    if value.trim().is_empty() {
        ColumnValue::Text(NOT_SPECIFIED.to_string())
    } else {
        ColumnValue::Text(value)
    }
}

fn full_name(record: &Record) -> ColumnValue {
    ColumnValue::Text(text_field(record, "full_name"))
}

fn gender(record: &Record) -> ColumnValue {
    ColumnValue::Text(capital_first_letter(&text_field(record, "gender")))
}

fn birthdate(record: &Record) -> ColumnValue {
    ColumnValue::Text(format_birthdate(&text_field(record, "birthdate")))
}

fn address(record: &Record) -> ColumnValue {
    text_or_placeholder(record, "address")
}

fn contact_numbers(record: &Record) -> ColumnValue {
    let numbers = list_field(record, "contact_numbers");
    if numbers.is_empty() {
        ColumnValue::Text(NOT_SPECIFIED.to_string())
    } else {
        ColumnValue::Text(numbers.join(", "))
    }
}

fn grade_level(record: &Record) -> ColumnValue {
    ColumnValue::Text(capital_first_letter(&text_field(record, "grade_level")))
}

fn school_year(record: &Record) -> ColumnValue {
    ColumnValue::Text(text_field(record, "school_year"))
}

fn discounts(record: &Record) -> ColumnValue {
    ColumnValue::List(
        list_field(record, "discount_types")
            .iter()
            .map(|c| discount_label(c))
            .collect(),
    )
}

fn total_amount(record: &Record) -> ColumnValue {
    ColumnValue::Text(format_currency(number_field(record, "total_amount")))
}

fn remaining_amount(record: &Record) -> ColumnValue {
    ColumnValue::Text(format_currency(number_field(record, "remaining_amount")))
}

fn payment_status(record: &Record) -> ColumnValue {
    ColumnValue::Text(capital_first_letter(&text_field(record, "payment_status")))
}

fn invoice_number(record: &Record) -> ColumnValue {
    ColumnValue::Text(text_field(record, "invoice_number"))
}

fn categories(record: &Record) -> ColumnValue {
    ColumnValue::List(
        list_field(record, "category")
            .iter()
            .map(|c| category_label(c))
            .collect(),
    )
}

fn payment_date(record: &Record) -> ColumnValue {
    ColumnValue::Text(format_short_date(&text_field(record, "payment_date")))
}

fn amount(record: &Record) -> ColumnValue {
    ColumnValue::Text(format_currency(number_field(record, "amount")))
}

fn payment_method(record: &Record) -> ColumnValue {
    ColumnValue::Text(payment_method_label(&text_field(record, "payment_method")))
}

fn enrollment_type(record: &Record) -> ColumnValue {
    ColumnValue::Text(capital_first_letter(&text_field(record, "type")))
}

pub fn student_columns() -> Vec<Column> {
    vec![
        Column {
            id: "full_name",
            header: Header::Sortable("Name"),
            accessor: full_name,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: false,
        },
        Column {
            id: "gender",
            header: Header::Filterable("Gender"),
            accessor: gender,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "birthdate",
            header: Header::Sortable("Birthdate"),
            accessor: birthdate,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "address",
            header: Header::Text("Address"),
            accessor: address,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "contact_numbers",
            header: Header::Text("Contact Numbers"),
            accessor: contact_numbers,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
    ]
}

/// Enrollment roster view: identity plus demographic filters.
pub fn enrollment_columns() -> Vec<Column> {
    vec![
        Column {
            id: "full_name",
            header: Header::Sortable("Name"),
            accessor: full_name,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: false,
        },
        Column {
            id: "type",
            header: Header::Filterable("Type"),
            accessor: enrollment_type,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "gender",
            header: Header::Filterable("Gender"),
            accessor: gender,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "grade_level",
            header: Header::Filterable("Grade Level"),
            accessor: grade_level,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::GradeLevel,
            footer: None,
            hideable: true,
        },
        Column {
            id: "school_year",
            header: Header::Text("School Year"),
            accessor: school_year,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "discount",
            header: Header::Filterable("Discount"),
            accessor: discounts,
            filter: Some(FilterKind::Intersects),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
    ]
}

/// Tuition ledger view: financial roll-up per live enrollment with footer
/// sums over the filtered set.
pub fn tuition_columns() -> Vec<Column> {
    vec![
        Column {
            id: "full_name",
            header: Header::Sortable("Name"),
            accessor: full_name,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: false,
        },
        Column {
            id: "grade_level",
            header: Header::Filterable("Grade Level"),
            accessor: grade_level,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::GradeLevel,
            footer: None,
            hideable: true,
        },
        Column {
            id: "school_year",
            header: Header::Text("School Year"),
            accessor: school_year,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "discount",
            header: Header::Filterable("Discount"),
            accessor: discounts,
            filter: Some(FilterKind::Intersects),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "total_amount",
            header: Header::Text("Total Amount"),
            accessor: total_amount,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: Some(Footer::Sum {
                field: "total_amount",
            }),
            hideable: true,
        },
        Column {
            id: "remaining_amount",
            header: Header::Text("Balance"),
            accessor: remaining_amount,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: Some(Footer::Sum {
                field: "remaining_amount",
            }),
            hideable: true,
        },
        Column {
            id: "payment_status",
            header: Header::Filterable("Status"),
            accessor: payment_status,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
    ]
}

pub fn transaction_columns() -> Vec<Column> {
    vec![
        Column {
            id: "invoice_number",
            header: Header::Sortable("O.R #"),
            accessor: invoice_number,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: false,
        },
        Column {
            id: "full_name",
            header: Header::Sortable("Name"),
            accessor: full_name,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "category",
            header: Header::Filterable("Category"),
            accessor: categories,
            filter: Some(FilterKind::Intersects),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "payment_date",
            header: Header::Sortable("Date"),
            accessor: payment_date,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
        Column {
            id: "amount",
            header: Header::Text("Amount"),
            accessor: amount,
            filter: None,
            option_order: OptionOrder::Appearance,
            footer: Some(Footer::Sum { field: "amount" }),
            hideable: true,
        },
        Column {
            id: "payment_method",
            header: Header::Filterable("Payment Method"),
            accessor: payment_method,
            filter: Some(FilterKind::AnyOf),
            option_order: OptionOrder::Appearance,
            footer: None,
            hideable: true,
        },
    ]
}

pub fn columns_for_entity(entity: &str) -> Option<Vec<Column>> {
    match entity {
        "students" => Some(student_columns()),
        "enrollments" => Some(enrollment_columns()),
        "tuitions" => Some(tuition_columns()),
        "transactions" => Some(transaction_columns()),
        _ => None,
    }
}

/// Per-view visibility defaults; anything not listed starts visible.
pub fn default_visibility(entity: &str) -> BTreeMap<String, bool> {
    let mut map = BTreeMap::new();
    match entity {
        "tuitions" => {
            map.insert("discount".to_string(), false);
        }
        "enrollments" => {
            map.insert("type".to_string(), false);
            map.insert("gender".to_string(), false);
        }
        _ => {}
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{distinct_options, TableState};
    use serde_json::json;

    fn tuition_record(name: &str, grade: &str, discounts: &[&str]) -> Record {
        json!({
            "id": name,
            "full_name": name,
            "grade_level": grade,
            "school_year": "2024-2025",
            "discount_types": discounts,
            "total_amount": 1000.0,
            "total_paid": 0.0,
            "remaining_amount": 1000.0,
            "payment_status": "unpaid",
        })
        .as_object()
        .cloned()
        .expect("record object")
    }

    #[test]
    fn grade_options_ignore_insertion_order() {
        let columns = tuition_columns();
        let rows = vec![
            tuition_record("A", "grade-2", &[]),
            tuition_record("B", "nursery-1", &[]),
            tuition_record("C", "grade-1", &[]),
        ];
        assert_eq!(
            distinct_options(&columns, &rows, "grade_level"),
            vec!["Nursery-1", "Grade-1", "Grade-2"]
        );
    }

    #[test]
    fn discount_options_use_display_labels() {
        let columns = tuition_columns();
        let rows = vec![
            tuition_record("A", "grade-1", &["rank_1", "sibling"]),
            tuition_record("B", "grade-1", &[]),
            tuition_record("C", "grade-1", &["sibling"]),
        ];
        assert_eq!(
            distinct_options(&columns, &rows, "discount"),
            vec!["Quipper/Books", "Siblings", "None"]
        );
    }

    #[test]
    fn accessors_are_total_over_malformed_records() {
        let columns = student_columns();
        let record: Record = json!({ "id": "x" }).as_object().cloned().expect("object");

        for column in &columns {
            // Must never panic; blank identity fields fall back to
            // placeholders where the view defines one.
            let _ = column.value(&record).display();
        }
        let address = crate::table::find_column(&columns, "address").expect("address");
        assert_eq!(address.value(&record).display(), NOT_SPECIFIED);
    }

    #[test]
    fn tuition_view_hides_discount_by_default() {
        let state = TableState {
            column_visibility: default_visibility("tuitions"),
            ..TableState::default()
        };
        let columns = tuition_columns();
        let visible = crate::table::visible_columns(&columns, &state);
        assert!(visible.iter().all(|c| c.id != "discount"));
        assert!(visible.iter().any(|c| c.id == "full_name"));
    }
}
