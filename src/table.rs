use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::format::format_currency;

/// One entity row as returned by the storage layer. Flat field -> value
/// mapping; a stable "id" field identifies the row.
pub type Record = serde_json::Map<String, Value>;

/// Fixed pedagogical ordering for grade-level filter options. Source data
/// order never influences this.
pub const GRADE_LEVEL_ORDER: [&str; 10] = [
    "Nursery-1",
    "Nursery-2",
    "Kinder-1",
    "Kinder-2",
    "Grade-1",
    "Grade-2",
    "Grade-3",
    "Grade-4",
    "Grade-5",
    "Grade-6",
];

/// Display value produced by a column accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    List(Vec<String>),
}

impl ColumnValue {
    pub fn display(&self) -> String {
        match self {
            ColumnValue::Text(s) => s.clone(),
            ColumnValue::List(items) if items.is_empty() => "None".to_string(),
            ColumnValue::List(items) => items.join(", "),
        }
    }

    /// Values a column filter tests against. Empty/missing maps to "None"
    /// so a selected "None" option matches blank cells.
    fn filter_terms(&self) -> Vec<String> {
        match self {
            ColumnValue::Text(s) if s.is_empty() => vec!["None".to_string()],
            ColumnValue::Text(s) => vec![s.clone()],
            ColumnValue::List(items) if items.is_empty() => vec!["None".to_string()],
            ColumnValue::List(items) => items.clone(),
        }
    }
}

/// How a column header participates in interaction.
#[derive(Debug, Clone, Copy)]
pub enum Header {
    Text(&'static str),
    Sortable(&'static str),
    Filterable(&'static str),
}

impl Header {
    pub fn title(&self) -> &'static str {
        match self {
            Header::Text(t) | Header::Sortable(t) | Header::Filterable(t) => t,
        }
    }
}

/// Filter semantics for a filterable column: single-valued columns match
/// against the selected set, array-valued columns match on a non-empty
/// intersection.
#[derive(Debug, Clone, Copy)]
pub enum FilterKind {
    AnyOf,
    Intersects,
}

/// Ordering applied to the derived distinct-option list of a filterable
/// column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionOrder {
    Appearance,
    GradeLevel,
}

/// Footer aggregate over the currently filtered row set. Sums read the raw
/// record field, not the formatted cell, coercing non-numeric to 0.
#[derive(Debug, Clone, Copy)]
pub enum Footer {
    Sum { field: &'static str },
}

pub struct Column {
    pub id: &'static str,
    pub header: Header,
    pub accessor: fn(&Record) -> ColumnValue,
    pub filter: Option<FilterKind>,
    pub option_order: OptionOrder,
    pub footer: Option<Footer>,
    pub hideable: bool,
}

impl Column {
    pub fn value(&self, record: &Record) -> ColumnValue {
        (self.accessor)(record)
    }
}

fn default_sort_direction() -> SortDirection {
    SortDirection::Asc
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sort {
    pub column: String,
    #[serde(default = "default_sort_direction")]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    #[serde(default)]
    pub values: Vec<String>,
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page_index: usize,
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page_index: 0,
            page_size: default_page_size(),
        }
    }
}

impl Pagination {
    pub fn first(&mut self) {
        self.page_index = 0;
    }

    pub fn previous(&mut self) {
        self.page_index = self.page_index.saturating_sub(1);
    }

    pub fn next(&mut self, page_count: usize) {
        if self.page_index + 1 < page_count {
            self.page_index += 1;
        }
    }

    pub fn last(&mut self, page_count: usize) {
        self.page_index = page_count.saturating_sub(1);
    }

    pub fn go_to(&mut self, page: usize, page_count: usize) {
        self.page_index = page.min(page_count.saturating_sub(1));
    }
}

/// Ephemeral view state: sort, per-column filters, global search, column
/// visibility and pagination. Derived row sets are recomputed from scratch
/// on every change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableState {
    pub sorting: Option<Sort>,
    pub column_filters: Vec<ColumnFilter>,
    pub global_filter: String,
    pub column_visibility: BTreeMap<String, bool>,
    pub pagination: Pagination,
}

impl TableState {
    /// Single active sort; setting the same column again flips direction.
    pub fn set_sort(&mut self, column: &str) {
        let direction = match &self.sorting {
            Some(s) if s.column == column && s.direction == SortDirection::Asc => {
                SortDirection::Desc
            }
            _ => SortDirection::Asc,
        };
        self.sorting = Some(Sort {
            column: column.to_string(),
            direction,
        });
    }

    /// An empty selection clears the filter for that column.
    pub fn set_column_filter(&mut self, column: &str, values: Vec<String>) {
        self.column_filters.retain(|f| f.column != column);
        if !values.is_empty() {
            self.column_filters.push(ColumnFilter {
                column: column.to_string(),
                values,
            });
        }
    }

    pub fn set_global_filter(&mut self, needle: &str) {
        self.global_filter = needle.to_string();
    }

    /// Changing the page size jumps back to the first page so a shrunken
    /// page grid never points past the data.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.pagination.page_size = page_size.max(1);
        self.pagination.page_index = 0;
    }
}

pub fn find_column<'a>(columns: &'a [Column], id: &str) -> Option<&'a Column> {
    columns.iter().find(|c| c.id == id)
}

pub fn visible_columns<'a>(columns: &'a [Column], state: &TableState) -> Vec<&'a Column> {
    columns
        .iter()
        .filter(|c| !c.hideable || *state.column_visibility.get(c.id).unwrap_or(&true))
        .collect()
}

/// Case-insensitive fuzzy match: substring first, character subsequence as
/// a fallback for loose typing.
pub fn fuzzy_match(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let haystack = haystack.to_lowercase();
    if haystack.contains(&needle) {
        return true;
    }
    let mut chars = needle.chars().peekable();
    for c in haystack.chars() {
        match chars.peek() {
            Some(&n) if n == c => {
                chars.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    chars.peek().is_none()
}

fn column_filter_matches(column: &Column, record: &Record, selected: &[String]) -> bool {
    match column.filter.unwrap_or(FilterKind::AnyOf) {
        FilterKind::AnyOf => {
            let value = column.value(record);
            let display = value.display();
            let key = if display.is_empty() { "None" } else { &display };
            selected.iter().any(|v| v == key)
        }
        FilterKind::Intersects => {
            let terms = column.value(record).filter_terms();
            selected.iter().any(|v| terms.contains(v))
        }
    }
}

/// Column filters AND across columns, OR within a column's selected values;
/// then the global fuzzy filter over the visible columns' display values.
pub fn filter_rows(columns: &[Column], records: &[Record], state: &TableState) -> Vec<Record> {
    let visible = visible_columns(columns, state);
    records
        .iter()
        .filter(|record| {
            state.column_filters.iter().all(|f| {
                if f.values.is_empty() {
                    return true;
                }
                match find_column(columns, &f.column) {
                    Some(col) => column_filter_matches(col, record, &f.values),
                    // Unknown column in the filter set never excludes rows.
                    None => true,
                }
            })
        })
        .filter(|record| {
            if state.global_filter.trim().is_empty() {
                return true;
            }
            let haystack = visible
                .iter()
                .map(|c| c.value(record).display())
                .collect::<Vec<_>>()
                .join(" ");
            fuzzy_match(&haystack, &state.global_filter)
        })
        .cloned()
        .collect()
}

fn sort_key(value: &ColumnValue) -> (Option<f64>, String) {
    let display = value.display();
    let stripped: String = display
        .chars()
        .filter(|c| *c != ',' && *c != '₱')
        .collect();
    (stripped.trim().parse::<f64>().ok(), display.to_lowercase())
}

/// Stable sort on the active sort column; numeric when both sides parse as
/// numbers (currency formatting stripped), case-insensitive text otherwise.
pub fn sort_rows(columns: &[Column], rows: &mut [Record], sorting: Option<&Sort>) {
    let Some(sort) = sorting else {
        return;
    };
    let Some(column) = find_column(columns, &sort.column) else {
        return;
    };

    rows.sort_by(|a, b| {
        let (na, ta) = sort_key(&column.value(a));
        let (nb, tb) = sort_key(&column.value(b));
        let ord = match (na, nb) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => ta.cmp(&tb),
        };
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Page index bounded into the filtered set: never an empty page while a
/// lower non-empty page exists.
pub fn clamp_page_index(total: usize, pagination: Pagination) -> usize {
    let pages = page_count(total, pagination.page_size);
    if pages == 0 {
        0
    } else {
        pagination.page_index.min(pages - 1)
    }
}

pub fn page_slice(rows: &[Record], pagination: Pagination) -> &[Record] {
    if pagination.page_size == 0 {
        return &[];
    }
    let index = clamp_page_index(rows.len(), pagination);
    let start = index * pagination.page_size;
    let end = (start + pagination.page_size).min(rows.len());
    if start >= rows.len() {
        &[]
    } else {
        &rows[start..end]
    }
}

/// "Showing X to Y of Z entries", or the empty-state line at zero rows.
pub fn summary_line(total: usize, pagination: Pagination) -> String {
    if total == 0 {
        return "No results found".to_string();
    }
    let index = clamp_page_index(total, pagination);
    let start = index * pagination.page_size + 1;
    let end = ((index + 1) * pagination.page_size).min(total);
    format!("Showing {} to {} of {} entries", start, end, total)
}

fn numeric_field(record: &Record, field: &str) -> f64 {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Footer cell for one column over the *filtered* row set (never just the
/// current page).
pub fn footer_value(column: &Column, filtered: &[Record]) -> Option<String> {
    match column.footer? {
        Footer::Sum { field } => {
            let total: f64 = filtered.iter().map(|r| numeric_field(r, field)).sum();
            Some(format_currency(total))
        }
    }
}

/// Distinct option values actually present in the dataset, mapped through
/// the column accessor (so display normalization applies), de-duplicated in
/// first-seen order. Grade-level columns reorder into the fixed pedagogical
/// sequence and drop values outside it.
pub fn distinct_options(columns: &[Column], records: &[Record], column_id: &str) -> Vec<String> {
    let Some(column) = find_column(columns, column_id) else {
        return Vec::new();
    };

    let mut options: Vec<String> = Vec::new();
    for record in records {
        for term in column.value(record).filter_terms() {
            if !options.contains(&term) {
                options.push(term);
            }
        }
    }

    if column.option_order == OptionOrder::GradeLevel {
        options.retain(|o| GRADE_LEVEL_ORDER.contains(&o.as_str()));
        options.sort_by_key(|o| GRADE_LEVEL_ORDER.iter().position(|g| g == o));
    }
    options
}
