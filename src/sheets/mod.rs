mod auth;
mod client;
mod formatting;

pub use client::SheetsClient;

// Re-export clear_tokens for CLI usage
pub use auth::clear_tokens as clear_sheets_tokens;

use crate::error::Result;
use async_trait::async_trait;
use google_sheets4::api::Sheet;
use serde_json::Value;

/// Low-level operations on one spreadsheet. Ranges use A1 notation.
#[async_trait]
pub trait SheetOperations {
    /// Find a tab by title.
    async fn get_sheet(&self, sheet_name: &str) -> Result<Option<Sheet>>;

    async fn create_sheet(&self, sheet_name: &str) -> Result<Sheet>;

    /// Cell values of `range` as rows. Dates are returned as serial numbers.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<Value>>>;

    /// Write the header row and make it bold and frozen.
    async fn write_header(&self, sheet: &Sheet, sheet_name: &str, headers: &[&str])
    -> Result<()>;

    /// Overwrite each `(range, row)` pair in a single request.
    async fn update_rows(&self, updates: Vec<(String, Vec<Value>)>) -> Result<()>;

    /// Insert rows after the last row with data.
    async fn append_rows(&self, sheet_name: &str, rows: Vec<Vec<Value>>) -> Result<()>;
}

/// A1 notation for a range on a tab, quoting the tab title.
pub fn a1_range(sheet_name: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet_name.replace('\'', "''"), cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a1_range_quotes_sheet_name() {
        assert_eq!(a1_range("Raw Data", "A:A"), "'Raw Data'!A:A");
        assert_eq!(a1_range("Bob's", "A5"), "'Bob''s'!A5");
    }
}
