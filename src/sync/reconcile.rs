use crate::error::Result;
use crate::models::{GarminMetrics, HEADERS};
use crate::sheets::{SheetOperations, a1_range};
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

/// Long-form date written by older versions, e.g. `Monday January 01,2024`.
const LEGACY_DATE_FORMATS: [&str; 2] = ["%A %B %d,%Y", "%A %B %d, %Y"];

/// What a reconciliation changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub appended: usize,
}

/// Rows to write, in processing order.
#[derive(Debug, Default, PartialEq)]
struct UpsertPlan {
    /// 1-based row number and new contents
    updates: Vec<(usize, Vec<Value>)>,
    appends: Vec<Vec<Value>>,
}

/// Upsert `records` into the tab `sheet_name`, one row per date.
///
/// The tab and its header are created when missing. Existing rows are
/// matched on the date in column A and overwritten in place; everything else
/// is appended.
#[instrument(name = "Reconciling sheet", skip(client, records), fields(records = records.len()))]
pub async fn reconcile_sheet<S>(
    client: &S,
    sheet_name: &str,
    records: &[GarminMetrics],
) -> Result<ReconcileSummary>
where
    S: SheetOperations + Sync,
{
    ensure_sheet(client, sheet_name).await?;

    let column = client
        .read_range(&a1_range(sheet_name, "A:A"))
        .await
        .inspect_err(|e| error!("Failed to read existing dates: {}", e))?;
    let index = index_dates(&column);
    debug!(existing = index.len(), "Indexed existing dates");

    let plan = plan_upsert(&index, records);
    commit(client, sheet_name, plan).await
}

async fn ensure_sheet<S>(client: &S, sheet_name: &str) -> Result<()>
where
    S: SheetOperations + Sync,
{
    let sheet = match client.get_sheet(sheet_name).await? {
        Some(sheet) => sheet,
        None => {
            info!("Sheet '{}' not found, creating it", sheet_name);
            client.create_sheet(sheet_name).await?
        }
    };

    let first_cell = client.read_range(&a1_range(sheet_name, "A1")).await?;
    if is_blank(&first_cell) {
        debug!("Sheet is empty, writing header row");
        client.write_header(&sheet, sheet_name, &HEADERS).await?;
    }

    Ok(())
}

async fn commit<S>(client: &S, sheet_name: &str, plan: UpsertPlan) -> Result<ReconcileSummary>
where
    S: SheetOperations + Sync,
{
    let summary = ReconcileSummary {
        updated: plan.updates.len(),
        appended: plan.appends.len(),
    };

    let updated = match plan.updates.is_empty() {
        true => Ok(()),
        false => {
            let updates = plan
                .updates
                .into_iter()
                .map(|(row, values)| (a1_range(sheet_name, &format!("A{}", row)), values))
                .collect();
            client
                .update_rows(updates)
                .await
                .inspect_err(|e| error!("Failed to update existing rows: {}", e))
        }
    };

    // Attempted even if the update failed
    let appended = match plan.appends.is_empty() {
        true => Ok(()),
        false => client
            .append_rows(sheet_name, plan.appends)
            .await
            .inspect_err(|e| error!("Failed to append new rows: {}", e)),
    };

    updated.and(appended)?;
    info!(
        updated = summary.updated,
        appended = summary.appended,
        "Sheet reconciled"
    );

    Ok(summary)
}

/// Map each date in column A to the first row it appears on.
fn index_dates(column: &[Vec<Value>]) -> HashMap<NaiveDate, usize> {
    let mut index = HashMap::new();
    for (i, row) in column.iter().enumerate() {
        if let Some(date) = row.first().and_then(date_from_cell) {
            index.entry(date).or_insert(i + 1);
        }
    }
    index
}

/// Partition records into in-place updates and appends. A date seen twice
/// keeps its first slot with the later record's values.
fn plan_upsert(index: &HashMap<NaiveDate, usize>, records: &[GarminMetrics]) -> UpsertPlan {
    let mut plan = UpsertPlan::default();
    let mut queued_updates: HashMap<NaiveDate, usize> = HashMap::new();
    let mut queued_appends: HashMap<NaiveDate, usize> = HashMap::new();

    for record in records {
        let row: Vec<Value> = record.to_row().iter().map(|cell| cell.to_json()).collect();

        match index.get(&record.date) {
            Some(&row_number) => match queued_updates.get(&record.date) {
                Some(&pos) => plan.updates[pos].1 = row,
                None => {
                    queued_updates.insert(record.date, plan.updates.len());
                    plan.updates.push((row_number, row));
                }
            },
            None => match queued_appends.get(&record.date) {
                Some(&pos) => plan.appends[pos] = row,
                None => {
                    queued_appends.insert(record.date, plan.appends.len());
                    plan.appends.push(row);
                }
            },
        }
    }

    plan
}

/// Interpret a date cell: ISO string, legacy long-form string or
/// spreadsheet serial number (days since 1899-12-30).
fn date_from_cell(cell: &Value) -> Option<NaiveDate> {
    match cell {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
                LEGACY_DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
            })
        }
        Value::Number(n) => {
            let days = n.as_f64()?.floor();
            if !(1.0..=2_958_465.0).contains(&days) {
                return None;
            }
            NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(days as i64))
        }
        _ => None,
    }
}

fn is_blank(rows: &[Vec<Value>]) -> bool {
    rows.iter().flatten().all(|cell| match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

#[cfg(test)]
mod mocks {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use google_sheets4::api::{Sheet, SheetProperties};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        CreateSheet(String),
        WriteHeader(String),
        UpdateRows(Vec<String>),
        AppendRows(usize),
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        pub tabs: BTreeMap<String, Vec<Vec<Value>>>,
        pub calls: Vec<Call>,
        pub fail_updates: bool,
        pub fail_appends: bool,
    }

    /// In-memory spreadsheet. Rows are stored as written.
    #[derive(Clone, Default)]
    pub(crate) struct MockSheetsClient {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockSheetsClient {
        pub fn with_rows(sheet_name: &str, rows: Vec<Vec<Value>>) -> Self {
            let client = Self::default();
            client
                .state
                .lock()
                .unwrap()
                .tabs
                .insert(sheet_name.to_string(), rows);
            client
        }

        pub fn rows(&self, sheet_name: &str) -> Vec<Vec<Value>> {
            self.state.lock().unwrap().tabs[sheet_name].clone()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn writes(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::UpdateRows(_) | Call::AppendRows(_)))
                .collect()
        }
    }

    /// Split `'Tab'!A1` into the unquoted tab title and the cell reference.
    fn split_range(range: &str) -> (String, String) {
        let pos = range.rfind("'!").unwrap();
        (range[1..pos].replace("''", "'"), range[pos + 2..].to_string())
    }

    fn sheet(title: &str) -> Sheet {
        Sheet {
            properties: Some(SheetProperties {
                title: Some(title.to_string()),
                sheet_id: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[async_trait]
    impl SheetOperations for MockSheetsClient {
        async fn get_sheet(&self, sheet_name: &str) -> Result<Option<Sheet>> {
            let state = self.state.lock().unwrap();
            Ok(state.tabs.contains_key(sheet_name).then(|| sheet(sheet_name)))
        }

        async fn create_sheet(&self, sheet_name: &str) -> Result<Sheet> {
            let mut state = self.state.lock().unwrap();
            state.tabs.insert(sheet_name.to_string(), Vec::new());
            state.calls.push(Call::CreateSheet(sheet_name.to_string()));
            Ok(sheet(sheet_name))
        }

        async fn read_range(&self, range: &str) -> Result<Vec<Vec<Value>>> {
            let (name, cells) = split_range(range);
            let state = self.state.lock().unwrap();
            let rows = &state.tabs[&name];

            let mut column: Vec<Vec<Value>> = match cells.as_str() {
                "A1" => rows.iter().take(1).map(|r| r.iter().take(1).cloned().collect()).collect(),
                "A:A" => rows
                    .iter()
                    .map(|r| r.iter().take(1).cloned().collect())
                    .collect(),
                other => panic!("unexpected range {}", other),
            };
            while column.last().is_some_and(|r| r.is_empty()) {
                column.pop();
            }
            Ok(column)
        }

        async fn write_header(
            &self,
            _sheet: &Sheet,
            sheet_name: &str,
            headers: &[&str],
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let header: Vec<Value> = headers.iter().map(|h| Value::from(*h)).collect();
            let rows = state.tabs.get_mut(sheet_name).unwrap();
            match rows.first_mut() {
                Some(first) => *first = header,
                None => rows.push(header),
            }
            state.calls.push(Call::WriteHeader(sheet_name.to_string()));
            Ok(())
        }

        async fn update_rows(&self, updates: Vec<(String, Vec<Value>)>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state
                .calls
                .push(Call::UpdateRows(updates.iter().map(|(r, _)| r.clone()).collect()));
            if state.fail_updates {
                return Err(AppError::Sheets("update failed".to_string()));
            }

            for (range, row) in updates {
                let (name, cells) = split_range(&range);
                let row_number: usize = cells.trim_start_matches('A').parse().unwrap();
                let rows = state.tabs.get_mut(&name).unwrap();
                if rows.len() < row_number {
                    rows.resize(row_number, Vec::new());
                }
                rows[row_number - 1] = row;
            }
            Ok(())
        }

        async fn append_rows(&self, sheet_name: &str, rows: Vec<Vec<Value>>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::AppendRows(rows.len()));
            if state.fail_appends {
                return Err(AppError::Sheets("append failed".to_string()));
            }

            state.tabs.get_mut(sheet_name).unwrap().extend(rows);
            Ok(())
        }
    }
}
