use crate::args::{ListArgs, OutputFormat};
use crate::commands::{plural, Out};
use crate::container::{EntityList, View};
use crate::error::{ErrorType, IntoResult, Res};
use crate::model::{Amount, FilterUpdate, Record, AMOUNT, CATEGORY, DATE, ID, NAME, STATUS};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeSet;

/// The columns every listing starts with. Other fields follow in alphabetical order.
const COLUMNS: [&str; 6] = [ID, DATE, NAME, CATEGORY, STATUS, AMOUNT];

/// The structured output of `elist list`.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    records: Vec<Record>,
    total: Amount,
    count: usize,
}

impl Listing {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn total(&self) -> Amount {
        self.total
    }
}

impl From<View> for Listing {
    fn from(view: View) -> Self {
        let total = view.total();
        let records = view.into_visible();
        Self {
            count: records.len(),
            records,
            total,
        }
    }
}

/// Loads the records, applies the filters from `args` and renders the visible records in the
/// requested format.
pub async fn list(list: EntityList, args: ListArgs) -> Result<Out<Listing>> {
    list.load().await?;

    let mut update = FilterUpdate {
        search_term: args.search().map(str::to_string),
        category: args.category().map(str::to_string),
        sort_by: args.sort().cloned(),
        ..Default::default()
    };
    for condition in args.conditions() {
        update
            .equals
            .insert(condition.key().to_string(), condition.text());
    }
    list.set_filter(update);

    let listing = Listing::from(list.view());
    let message = render(&listing, args.format()).pub_result(ErrorType::Io)?;
    Ok(Out::new(message, listing))
}

fn render(listing: &Listing, format: OutputFormat) -> Res<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(listing).context("Unable to serialize the records")
        }
        OutputFormat::Csv => to_csv(listing),
        OutputFormat::Table => Ok(to_table(listing)),
    }
}

fn columns(records: &[Record]) -> Vec<String> {
    let others: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.fields().other.keys())
        .collect();
    COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(others.into_iter().cloned())
        .collect()
}

fn cell(record: &Record, column: &str) -> String {
    if column == AMOUNT {
        return record.amount().value().to_string();
    }
    record.text(column).map(|s| s.into_owned()).unwrap_or_default()
}

fn to_csv(listing: &Listing) -> Res<String> {
    let columns = columns(&listing.records);
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&columns)?;
    for record in &listing.records {
        wtr.write_record(columns.iter().map(|c| cell(record, c)))?;
    }
    let bytes = wtr.into_inner().context("Unable to flush CSV output")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn to_table(listing: &Listing) -> String {
    let columns = columns(&listing.records);
    let rows: Vec<Vec<String>> = listing
        .records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| match c.as_str() {
                    AMOUNT => record.amount().to_string(),
                    _ => cell(record, c),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(ix, c)| {
            rows.iter()
                .map(|row| row[ix].chars().count())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .zip(&columns)
            .map(|((cell, width), column)| {
                if column == AMOUNT {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&columns));
    out.push('\n');
    for row in &rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&format!(
        "Total: {} ({})",
        listing.total,
        plural(listing.count, "record")
    ));
    out
}
