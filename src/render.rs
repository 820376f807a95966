use serde::Serialize;
use std::collections::BTreeMap;

use crate::table::{
    clamp_page_index, distinct_options, filter_rows, footer_value, page_count, page_slice,
    sort_rows, summary_line, visible_columns, Column, Header, Record, TableState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderCell {
    pub id: String,
    pub title: String,
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedRow {
    /// Record identifier handed to the navigation collaborator on click.
    pub id: String,
    pub cells: Vec<String>,
}

/// One fully materialized table page: the only thing a display surface
/// needs to paint the grid.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<RenderedRow>,
    /// Aligned with `headers`; present only when the filtered set is
    /// non-empty and at least one visible column aggregates.
    pub footer: Option<Vec<String>>,
    pub summary: String,
    pub page_index: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub total: usize,
    pub filter_options: BTreeMap<String, Vec<String>>,
    pub empty: bool,
}

fn header_kind(header: &Header) -> &'static str {
    match header {
        Header::Text(_) => "text",
        Header::Sortable(_) => "sortable",
        Header::Filterable(_) => "filterable",
    }
}

fn record_id(record: &Record) -> String {
    record
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Pure projection from (columns x records x view state) to a page of
/// display cells. Footer aggregates run over the whole filtered set, not
/// the page slice; filter options derive from the full dataset.
pub fn render(columns: &[Column], records: &[Record], state: &TableState) -> TableView {
    let mut filtered = filter_rows(columns, records, state);
    sort_rows(columns, &mut filtered, state.sorting.as_ref());

    let total = filtered.len();
    let page_index = clamp_page_index(total, state.pagination);
    let pages = page_count(total, state.pagination.page_size);
    let page = page_slice(&filtered, state.pagination);

    let visible = visible_columns(columns, state);
    let headers: Vec<HeaderCell> = visible
        .iter()
        .map(|c| HeaderCell {
            id: c.id.to_string(),
            title: c.header.title().to_string(),
            kind: header_kind(&c.header),
        })
        .collect();

    let rows: Vec<RenderedRow> = page
        .iter()
        .map(|record| RenderedRow {
            id: record_id(record),
            cells: visible.iter().map(|c| c.value(record).display()).collect(),
        })
        .collect();

    let footer = if total > 0 && visible.iter().any(|c| c.footer.is_some()) {
        Some(
            visible
                .iter()
                .map(|c| footer_value(c, &filtered).unwrap_or_default())
                .collect(),
        )
    } else {
        None
    };

    let filter_options: BTreeMap<String, Vec<String>> = columns
        .iter()
        .filter(|c| matches!(c.header, Header::Filterable(_)))
        .map(|c| (c.id.to_string(), distinct_options(columns, records, c.id)))
        .collect();

    TableView {
        headers,
        rows,
        footer,
        summary: summary_line(total, state.pagination),
        page_index,
        page_count: pages,
        page_size: state.pagination.page_size,
        total,
        filter_options,
        empty: total == 0,
    }
}
