//! Fetches a page and turns its first non-empty `<table>` into a [`Dataset`].
//!
//! Extraction follows what common HTML table readers do: header rows come
//! from `<thead>` or from leading all-`<th>` rows, `colspan`/`rowspan` are
//! expanded into a rectangular grid, hidden elements and footnote markers
//! are dropped from cell text, and each column is typed as a whole
//! (integer, float or string, with empty cells null).

use crate::domain::model::{Dataset, Record};
use crate::domain::ports::{ConfigProvider, TableSource};
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Upper bound on a single cell's span; larger values are treated as this.
const MAX_SPAN: usize = 1000;

pub struct HttpTableSource {
    client: Client,
}

impl HttpTableSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent());
        if let Some(timeout) = config.fetch_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }
}

impl TableSource for HttpTableSource {
    async fn fetch_table(&self, url: &str) -> Result<Dataset> {
        let target = Url::parse(url)?;

        tracing::debug!("Fetching table page: {}", target);
        let response = self.client.get(target.clone()).send().await?;
        tracing::debug!("Source response status: {}", response.status());

        let html = response.error_for_status()?.text().await?;
        tracing::debug!(bytes = html.len(), "source page received");

        parse_first_table(&html, target.as_str())
    }
}

struct RawCell {
    text: String,
    is_header: bool,
    colspan: usize,
    rowspan: usize,
}

struct RawRow {
    in_thead: bool,
    cells: Vec<RawCell>,
}

/// Parses `html` and returns the first table in document order that has at
/// least one row.
pub fn parse_first_table(html: &str, source: &str) -> Result<Dataset> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("table")
        .map_err(|e| EtlError::processing(format!("invalid table selector: {}", e)))?;

    let rows = document
        .select(&selector)
        .map(table_rows)
        .find(|rows| rows.iter().any(|r| !r.cells.is_empty()))
        .ok_or_else(|| EtlError::TableNotFoundError {
            url: source.to_string(),
        })?;

    Ok(build_dataset(&rows))
}

/// Header rows become column names; the rest become records. A table of
/// headers only gives a dataset with columns and no records.
fn build_dataset(rows: &[RawRow]) -> Dataset {
    let header_count = count_header_rows(rows);
    let grid = expand_spans(rows);

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let (header_grid, body_grid) = grid.split_at(header_count.min(grid.len()));
    let body: Vec<&Vec<Option<String>>> = body_grid.iter().filter(|row| !row.is_empty()).collect();

    let columns = column_names(header_grid, width);
    let kinds: Vec<CellKind> = (0..columns.len())
        .map(|i| {
            let present: Vec<&str> = body.iter().filter_map(|row| row.get(i)?.as_deref()).collect();
            column_kind(&present)
        })
        .collect();

    let records = body
        .into_iter()
        .map(|row| {
            let mut record = Record::default();
            for (i, column) in columns.iter().enumerate() {
                let text = row.get(i).cloned().flatten();
                record.set(column.clone(), typed_cell(text, kinds[i]));
            }
            record
        })
        .collect();

    Dataset::new(columns, records)
}

/// Rows owned by this table, skipping rows of nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<RawRow> {
    let mut rows = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(raw_row(child, false)),
            section @ ("thead" | "tbody" | "tfoot") => {
                let in_thead = section == "thead";
                for tr in child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr")
                {
                    rows.push(raw_row(tr, in_thead));
                }
            }
            _ => {}
        }
    }

    rows
}

fn raw_row(tr: ElementRef<'_>, in_thead: bool) -> RawRow {
    let cells = tr
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .map(|cell| RawCell {
            text: cell_text(cell),
            is_header: cell.value().name() == "th",
            colspan: span_attr(cell, "colspan"),
            rowspan: span_attr(cell, "rowspan"),
        })
        .collect();

    RawRow { in_thead, cells }
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map_or(1, |n| n.min(MAX_SPAN))
}

fn count_header_rows(rows: &[RawRow]) -> usize {
    let in_thead = rows.iter().filter(|r| r.in_thead).count();
    if in_thead > 0 {
        return in_thead;
    }

    rows.iter()
        .take_while(|r| !r.cells.is_empty() && r.cells.iter().all(|c| c.is_header))
        .count()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(cell, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }

        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        if is_hidden(child) {
            continue;
        }
        if child.value().name() == "br" {
            out.push(' ');
            continue;
        }
        collect_text(child, out);
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    let el = element.value();

    if matches!(el.name(), "script" | "style" | "template") {
        return true;
    }
    if el.name() == "sup" && el.classes().any(|c| c == "reference") {
        return true;
    }

    el.attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none")
    })
}

/// Lays cells onto a grid, repeating spanned text into every covered slot.
fn expand_spans(rows: &[RawRow]) -> Vec<Vec<Option<String>>> {
    // per column: rows still covered by a rowspan above, and the carried text
    let mut carried: Vec<Option<(usize, Option<String>)>> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for row in rows {
        let mut out: Vec<Option<String>> = Vec::new();
        let mut cells = row.cells.iter();
        let mut col = 0;

        loop {
            while let Some(slot) = carried.get_mut(col) {
                let Some((remaining, text)) = slot.take() else {
                    break;
                };
                out.push(text.clone());
                if remaining > 1 {
                    *slot = Some((remaining - 1, text));
                }
                col += 1;
            }

            let Some(cell) = cells.next() else {
                break;
            };

            let value = (!cell.text.is_empty()).then(|| cell.text.clone());
            for _ in 0..cell.colspan {
                if cell.rowspan > 1 {
                    if carried.len() <= col {
                        carried.resize(col + 1, None);
                    }
                    carried[col] = Some((cell.rowspan - 1, value.clone()));
                }
                out.push(value.clone());
                col += 1;
            }
        }

        // a short row still consumes rowspans running to its right
        let last_active = carried.iter().rposition(Option::is_some);
        while last_active.is_some_and(|last| col <= last) {
            match carried[col].take() {
                Some((remaining, text)) => {
                    out.push(text.clone());
                    if remaining > 1 {
                        carried[col] = Some((remaining - 1, text));
                    }
                }
                None => out.push(None),
            }
            col += 1;
        }

        grid.push(out);
    }

    grid
}

fn column_names(header_grid: &[Vec<Option<String>>], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    (0..width)
        .map(|i| {
            let mut labels: Vec<&str> = Vec::new();
            for row in header_grid {
                if let Some(Some(label)) = row.get(i) {
                    if labels.last() != Some(&label.as_str()) {
                        labels.push(label);
                    }
                }
            }

            let base = if labels.is_empty() {
                i.to_string()
            } else {
                labels.join(" ")
            };

            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellKind {
    Integer,
    Float,
    Text,
}

/// A column is numeric only when every non-empty cell in it parses.
fn column_kind(cells: &[&str]) -> CellKind {
    if cells.iter().all(|t| t.parse::<i64>().is_ok()) {
        CellKind::Integer
    } else if cells
        .iter()
        .all(|t| t.parse::<f64>().is_ok_and(|v| v.is_finite()))
    {
        CellKind::Float
    } else {
        CellKind::Text
    }
}

fn typed_cell(text: Option<String>, kind: CellKind) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    match kind {
        CellKind::Integer => match text.parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => Value::String(text),
        },
        CellKind::Float => match text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Some(n) => Value::Number(n),
            None => Value::String(text),
        },
        CellKind::Text => Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const FILMS_PAGE: &str = r#"
<html><body>
<p>Intro</p>
<table class="wikitable">
  <caption>Highest-grossing films</caption>
  <tbody>
    <tr><th>Rank</th><th>Peak</th><th>Title</th><th>Worldwide gross</th><th>Year</th></tr>
    <tr><td>1</td><td>1</td><th scope="row">Avatar</th><td>$2,923,706,026<sup class="reference">[1]</sup></td><td>2009</td></tr>
    <tr><td>2</td><td>1</td><th scope="row">Avengers: Endgame</th><td>$2,797,501,328</td><td>2019</td></tr>
    <tr><td>3</td><td>1</td><th scope="row">Titanic</th><td>$2,257,844,554</td><td>1997</td></tr>
  </tbody>
</table>
<table><tr><th>Other</th></tr><tr><td>ignored</td></tr></table>
</body></html>
"#;

    #[test]
    fn test_parse_first_table_headers_and_types() {
        let ds = parse_first_table(FILMS_PAGE, "test://films").unwrap();

        assert_eq!(ds.columns, vec!["Rank", "Peak", "Title", "Worldwide gross", "Year"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[0].get("Rank"), &json!(1));
        assert_eq!(ds.records[0].get("Title"), &json!("Avatar"));
        assert_eq!(ds.records[0].get("Worldwide gross"), &json!("$2,923,706,026"));
        assert_eq!(ds.records[2].get("Year"), &json!(1997));
    }

    #[test]
    fn test_thead_rows_are_headers() {
        let html = r#"<table>
            <thead><tr><td>Name</td><td>Score</td></tr></thead>
            <tbody><tr><td>a</td><td>1.5</td></tr></tbody>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.columns, vec!["Name", "Score"]);
        assert_eq!(ds.records[0].get("Score"), &json!(1.5));
    }

    #[test]
    fn test_rowspan_and_colspan_are_expanded() {
        let html = r#"<table>
            <tr><th>Rank</th><th>Peak</th><th>Title</th></tr>
            <tr><td>1</td><td rowspan="2">1</td><td>A</td></tr>
            <tr><td>2</td><td>B</td></tr>
            <tr><td colspan="2">3</td><td>C</td></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[1].get("Peak"), &json!(1));
        assert_eq!(ds.records[1].get("Title"), &json!("B"));
        assert_eq!(ds.records[2].get("Rank"), &json!(3));
        assert_eq!(ds.records[2].get("Peak"), &json!(3));
        assert_eq!(ds.records[2].get("Title"), &json!("C"));
    }

    #[test]
    fn test_hidden_text_is_dropped_and_empty_cells_are_null() {
        let html = r#"<table>
            <tr><th>Title</th><th>Gross</th></tr>
            <tr><td><span style="display: none">sortkey</span>Frozen<br>II</td><td></td></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.records[0].get("Title"), &json!("Frozen II"));
        assert_eq!(ds.records[0].get("Gross"), &Value::Null);
    }

    #[test]
    fn test_headerless_table_and_duplicate_names() {
        let html = "<table><tr><td>x</td><td>y</td></tr></table>";
        let ds = parse_first_table(html, "t").unwrap();
        assert_eq!(ds.columns, vec!["0", "1"]);

        let html = "<table><tr><th>A</th><th>A</th></tr><tr><td>1</td><td>2</td></tr></table>";
        let ds = parse_first_table(html, "t").unwrap();
        assert_eq!(ds.columns, vec!["A", "A.1"]);
        assert_eq!(ds.records[0].get("A.1"), &json!(2));
    }

    #[test]
    fn test_nested_table_rows_are_not_mixed_in() {
        let html = r#"<table>
            <tr><th>Outer</th></tr>
            <tr><td><table><tr><td>inner</td></tr></table>cell</td></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records[0].get("Outer"), &json!("innercell"));
    }

    #[test]
    fn test_page_without_table_is_error() {
        let err = parse_first_table("<html><p>no data</p></html>", "http://x").unwrap_err();
        assert!(matches!(err, EtlError::TableNotFoundError { .. }));

        let err = parse_first_table("<table></table><table><tr></tr></table>", "http://x").unwrap_err();
        assert!(matches!(err, EtlError::TableNotFoundError { .. }));
    }

    #[test]
    fn test_header_only_table_has_columns_and_no_rows() {
        let html = "<table><tr><th>Title</th><th>Worldwide gross</th></tr></table>";
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.columns, vec!["Title", "Worldwide gross"]);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_empty_tables_before_the_data_are_skipped() {
        let html = r#"<table></table>
            <table><tr><th>Title</th><th>Gross</th></tr>
            <tr><td>A (1999)</td><td>$2,100,000,000</td></tr></table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.columns, vec!["Title", "Gross"]);
        assert_eq!(ds.records[0].get("Title"), &json!("A (1999)"));
    }

    #[test]
    fn test_short_row_under_rowspan_stays_aligned() {
        let html = r#"<table>
            <tr><th>A</th><th>B</th><th>C</th></tr>
            <tr><td>1</td><td>2</td><td rowspan="2">X</td></tr>
            <tr><td>3</td></tr>
            <tr><td>a</td><td>b</td><td>c</td></tr>
            <tr></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.columns, vec!["A", "B", "C"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[1].get("A"), &json!("3"));
        assert_eq!(ds.records[1].get("B"), &Value::Null);
        assert_eq!(ds.records[1].get("C"), &json!("X"));
        assert_eq!(ds.records[2].get("A"), &json!("a"));
        assert_eq!(ds.records[2].get("C"), &json!("c"));
    }

    #[test]
    fn test_empty_row_consumes_running_rowspan() {
        let html = r#"<table>
            <tr><th>K</th><th>V</th></tr>
            <tr><td rowspan="2">k</td><td>1</td></tr>
            <tr></tr>
            <tr><td>m</td><td>2</td></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[1].get("K"), &json!("k"));
        assert_eq!(ds.records[1].get("V"), &Value::Null);
        assert_eq!(ds.records[2].get("K"), &json!("m"));
        assert_eq!(ds.records[2].get("V"), &json!(2));
    }

    #[test]
    fn test_cells_are_typed_per_column() {
        let html = r#"<table>
            <tr><th>Title</th><th>Rank</th><th>Score</th></tr>
            <tr><td>007</td><td>1</td><td>2</td></tr>
            <tr><td>1e3</td><td>2</td><td>2.5</td></tr>
            <tr><td>Heat</td><td></td><td>3</td></tr>
        </table>"#;
        let ds = parse_first_table(html, "t").unwrap();

        assert_eq!(ds.records[0].get("Title"), &json!("007"));
        assert_eq!(ds.records[1].get("Title"), &json!("1e3"));
        assert_eq!(ds.records[1].get("Rank"), &json!(2));
        assert_eq!(ds.records[2].get("Rank"), &Value::Null);
        assert_eq!(ds.records[0].get("Score"), &json!(2.0));
    }

    #[tokio::test]
    async fn test_fetch_table_over_http() {
        let server = MockServer::start_async().await;
        let page_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/wiki/films");
                then.status(200)
                    .header("Content-Type", "text/html")
                    .body(FILMS_PAGE);
            })
            .await;

        let source = HttpTableSource::new(Client::new());
        let ds = source.fetch_table(&server.url("/wiki/films")).await.unwrap();

        page_mock.assert_async().await;
        assert_eq!(ds.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_table_http_error_status() {
        let server = MockServer::start_async().await;
        let page_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let source = HttpTableSource::new(Client::new());
        let err = source.fetch_table(&server.url("/missing")).await.unwrap_err();

        page_mock.assert_async().await;
        assert!(matches!(err, EtlError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_fetch_table_rejects_bad_url() {
        let source = HttpTableSource::new(Client::new());
        let err = source.fetch_table("not a url").await.unwrap_err();
        assert!(matches!(err, EtlError::UrlError(_)));
    }
}
