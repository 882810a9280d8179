use super::SheetOperations;
use super::formatting::header_rules;
use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use crate::sheets::a1_range;
use crate::sheets::auth::create_and_verify_authenticator;
use async_trait::async_trait;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, BatchUpdateValuesRequest, Request, Scope,
    Sheet, SheetProperties, Sheets, ValueRange,
};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value;
use tracing::{debug, instrument};

// Read and write access to spreadsheets the credentials can see
pub(crate) const AUTH_SCOPE: Scope = Scope::Spreadsheet;

pub struct SheetsClient {
    hub: Sheets<HttpsConnector<HttpConnector>>,
    spreadsheet_id: String,
}

impl SheetsClient {
    /// Create a new SheetsClient with authenticated access to one spreadsheet
    #[instrument(name = "Authenticating to Google Sheets", skip_all)]
    pub async fn new(config: &GoogleConfig, spreadsheet_id: &str) -> Result<Self> {
        let auth = create_and_verify_authenticator(config).await?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Sheets(format!("Failed to load root certificates: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: Sheets::new(client, auth),
            spreadsheet_id: spreadsheet_id.to_string(),
        })
    }

    pub fn spreadsheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}",
            self.spreadsheet_id
        )
    }
}

/// Token problems become `AppError::Auth` so the caller can offer to reset them.
fn api_error(context: &str, err: google_sheets4::Error) -> AppError {
    let is_auth = match &err {
        google_sheets4::Error::MissingToken(_) => true,
        google_sheets4::Error::BadRequest(body) => {
            body.pointer("/error/code").and_then(Value::as_i64) == Some(401)
                || body.pointer("/error/status").and_then(Value::as_str) == Some("UNAUTHENTICATED")
        }
        _ => false,
    };

    match is_auth {
        true => AppError::Auth(format!("{}: {}", context, err)),
        false => AppError::Sheets(format!("{}: {}", context, err)),
    }
}

#[async_trait]
impl SheetOperations for SheetsClient {
    async fn get_sheet(&self, sheet_name: &str) -> Result<Option<Sheet>> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .include_grid_data(false)
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to get spreadsheet", e))?;

        let sheet = spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .find(|sheet| {
                sheet
                    .properties
                    .as_ref()
                    .map(|props| props.title.as_deref() == Some(sheet_name))
                    .unwrap_or(false)
            });

        Ok(sheet)
    }

    #[instrument(name = "Creating sheet", skip(self))]
    async fn create_sheet(&self, sheet_name: &str) -> Result<Sheet> {
        let request = Request {
            add_sheet: Some(AddSheetRequest {
                properties: Some(SheetProperties {
                    title: Some(sheet_name.to_string()),
                    sheet_type: Some("GRID".to_string()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };

        let batch_update = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![request]),
            include_spreadsheet_in_response: Some(false),
            ..Default::default()
        };

        let (_, response) = self
            .hub
            .spreadsheets()
            .batch_update(batch_update, &self.spreadsheet_id)
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to create sheet", e))?;

        let sheet_properties = response
            .replies
            .and_then(|replies| replies.into_iter().next())
            .and_then(|reply| reply.add_sheet)
            .and_then(|add_sheet| add_sheet.properties)
            .ok_or_else(|| {
                AppError::Sheets("Failed to get sheet properties from create response".to_string())
            })?;
        debug!(sheet_id = ?sheet_properties.sheet_id, "Created sheet");

        Ok(Sheet {
            properties: Some(sheet_properties),
            ..Default::default()
        })
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let (_, response) = self
            .hub
            .spreadsheets()
            .values_get(&self.spreadsheet_id, range)
            .value_render_option("UNFORMATTED_VALUE")
            .date_time_render_option("SERIAL_NUMBER")
            .major_dimension("ROWS")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error(&format!("Failed to read range {}", range), e))?;

        Ok(response.values.unwrap_or_default())
    }

    #[instrument(name = "Writing header row", skip(self, sheet, headers))]
    async fn write_header(
        &self,
        sheet: &Sheet,
        sheet_name: &str,
        headers: &[&str],
    ) -> Result<()> {
        let sheet_id = sheet
            .properties
            .as_ref()
            .and_then(|p| p.sheet_id)
            .ok_or_else(|| AppError::Sheets("Sheet ID not found".to_string()))?;

        let range = a1_range(sheet_name, "A1");
        let value_range = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            range: Some(range.clone()),
            values: Some(vec![
                headers
                    .iter()
                    .map(|h| Value::String(h.to_string()))
                    .collect(),
            ]),
        };

        self.hub
            .spreadsheets()
            .values_update(value_range, &self.spreadsheet_id, &range)
            .value_input_option("RAW")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to write header", e))?;

        let batch_update = BatchUpdateSpreadsheetRequest {
            requests: Some(header_rules(sheet_id)),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .batch_update(batch_update, &self.spreadsheet_id)
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to format header", e))?;

        Ok(())
    }

    #[instrument(name = "Updating rows", skip_all, fields(count = updates.len()))]
    async fn update_rows(&self, updates: Vec<(String, Vec<Value>)>) -> Result<()> {
        let data = updates
            .into_iter()
            .map(|(range, row)| ValueRange {
                major_dimension: Some("ROWS".to_string()),
                range: Some(range),
                values: Some(vec![row]),
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data: Some(data),
            value_input_option: Some("RAW".to_string()),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .values_batch_update(request, &self.spreadsheet_id)
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to update rows", e))?;

        Ok(())
    }

    #[instrument(name = "Appending rows", skip(self, rows), fields(count = rows.len()))]
    async fn append_rows(&self, sheet_name: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let range = a1_range(sheet_name, "A1");
        let value_range = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            range: Some(range.clone()),
            values: Some(rows),
        };

        self.hub
            .spreadsheets()
            .values_append(value_range, &self.spreadsheet_id, &range)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .add_scope(AUTH_SCOPE)
            .doit()
            .await
            .map_err(|e| api_error("Failed to append rows", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unauthenticated_response_is_auth_error() {
        let err = google_sheets4::Error::BadRequest(json!({
            "error": { "code": 401, "status": "UNAUTHENTICATED", "message": "Invalid Credentials" }
        }));
        assert!(matches!(api_error("Failed", err), AppError::Auth(_)));
    }

    #[test]
    fn test_other_bad_request_is_sheets_error() {
        let err = google_sheets4::Error::BadRequest(json!({
            "error": { "code": 400, "status": "INVALID_ARGUMENT", "message": "Unable to parse range" }
        }));
        assert!(matches!(api_error("Failed", err), AppError::Sheets(_)));
    }
}
