//! Google Sheets adapter.
//!
//! [`RowStore`] is the seam the record stores talk through: ordered data
//! rows in, positional value-arrays out. [`SheetsClient`] implements it
//! against one spreadsheet tab over the Sheets v4 REST API, sharing a
//! [`GoogleAuth`] token cache with its sibling client. The auth handle and
//! both clients are constructed once at startup and injected; there is no
//! process-global state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::config::SheetConfig;
use crate::error::{Error, Result};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Refresh the cached token when it has less than this long to live.
const TOKEN_SLACK_SECS: i64 = 60;

/// Ordered row access to one backing sheet. Row indices are zero-based
/// positions within the data range (the header row is never visible here);
/// the sheet row a record occupies is `index + 2`.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All data rows in sheet order. Trailing blank cells may be absent.
    async fn rows(&self) -> Result<Vec<Vec<String>>>;

    /// Append one row after the last data row.
    async fn append(&self, row: Vec<String>) -> Result<()>;

    /// Rewrite the row at `index` in place.
    async fn update(&self, index: usize, row: Vec<String>) -> Result<()>;

    /// Remove the row at `index`, shifting later rows up.
    async fn delete(&self, index: usize) -> Result<()>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Service-account OAuth2 for the Sheets scope.
///
/// Signs a JWT-bearer assertion with the account's RSA key and swaps it for
/// an access token, caching the token until shortly before expiry.
pub struct GoogleAuth {
    http: reqwest::Client,
    email: String,
    key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl GoogleAuth {
    pub fn new(http: reqwest::Client, email: String, private_key_pem: &str) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
        Ok(Self {
            http,
            email,
            key,
            token: Mutex::new(None),
        })
    }

    /// Return a valid access token, minting a fresh one if the cached
    /// token is missing or about to expire.
    pub async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Utc::now() > Duration::seconds(TOKEN_SLACK_SECS) {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.email,
            scope: SCOPE,
            aud: TOKEN_URL,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)?;

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(expires_in = response.expires_in, "Obtained access token");

        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        });

        Ok(response.access_token)
    }
}

/// `values.get`/`values.append`/`values.update` payloads.
#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// One spreadsheet tab exposed as a [`RowStore`].
pub struct SheetsClient {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    spreadsheet_id: String,
    tab: String,
    last_column: char,
    /// Numeric sheet id of the tab, resolved lazily for row deletion.
    gid: OnceCell<i64>,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<GoogleAuth>,
        sheet: SheetConfig,
        last_column: char,
    ) -> Self {
        Self {
            http,
            auth,
            spreadsheet_id: sheet.spreadsheet_id,
            tab: sheet.tab,
            last_column,
            gid: OnceCell::new(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!("{API_BASE}/{}/values/{range}", self.spreadsheet_id)
    }

    /// Resolve the tab title to its numeric sheet id, caching the answer.
    async fn sheet_gid(&self) -> Result<i64> {
        #[derive(Deserialize)]
        struct Meta {
            sheets: Vec<SheetEntry>,
        }
        #[derive(Deserialize)]
        struct SheetEntry {
            properties: SheetProperties,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SheetProperties {
            sheet_id: i64,
            title: String,
        }

        self.gid
            .get_or_try_init(|| async {
                let token = self.auth.bearer_token().await?;
                let meta: Meta = self
                    .http
                    .get(format!("{API_BASE}/{}", self.spreadsheet_id))
                    .query(&[("fields", "sheets.properties")])
                    .bearer_auth(token)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                meta.sheets
                    .into_iter()
                    .find(|s| s.properties.title == self.tab)
                    .map(|s| s.properties.sheet_id)
                    .ok_or_else(|| Error::UnknownTab(self.tab.clone()))
            })
            .await
            .copied()
    }
}

#[async_trait]
impl RowStore for SheetsClient {
    async fn rows(&self) -> Result<Vec<Vec<String>>> {
        let token = self.auth.bearer_token().await?;
        let range = data_range(&self.tab, self.last_column);

        let response: ValueRange = self
            .http
            .get(self.values_url(&range))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(tab = %self.tab, count = response.values.len(), "Fetched rows");
        Ok(response.values)
    }

    async fn append(&self, row: Vec<String>) -> Result<()> {
        let token = self.auth.bearer_token().await?;
        let range = append_range(&self.tab, self.last_column);

        self.http
            .post(format!("{}:append", self.values_url(&range)))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn update(&self, index: usize, row: Vec<String>) -> Result<()> {
        let token = self.auth.bearer_token().await?;
        let range = row_range(&self.tab, self.last_column, index);

        self.http
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn delete(&self, index: usize) -> Result<()> {
        let gid = self.sheet_gid().await?;
        let token = self.auth.bearer_token().await?;

        // Grid coordinates are zero-based and include the header row, so
        // data row `index` sits at grid row `index + 1`.
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": gid,
                        "dimension": "ROWS",
                        "startIndex": index + 1,
                        "endIndex": index + 2,
                    }
                }
            }]
        });

        self.http
            .post(format!("{API_BASE}/{}:batchUpdate", self.spreadsheet_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Data range skipping the header row, e.g. `Sheet1!A2:M`.
fn data_range(tab: &str, last_column: char) -> String {
    format!("{tab}!A2:{last_column}")
}

/// Open-ended range used for appends, e.g. `Sheet1!A:M`.
fn append_range(tab: &str, last_column: char) -> String {
    format!("{tab}!A:{last_column}")
}

/// Single-row range for an in-place rewrite. Sheet rows are one-based and
/// the header occupies row 1, hence `index + 2`.
fn row_range(tab: &str, last_column: char, index: usize) -> String {
    let sheet_row = index + 2;
    format!("{tab}!A{sheet_row}:{last_column}{sheet_row}")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_range_skips_header_row() {
        assert_eq!(data_range("Sheet1", 'M'), "Sheet1!A2:M");
    }

    #[test]
    fn test_append_range_is_open_ended() {
        assert_eq!(append_range("Leads", 'M'), "Leads!A:M");
    }

    #[test]
    fn test_row_range_offsets_for_header_and_one_based_rows() {
        // Record index 0 lives in sheet row 2.
        assert_eq!(row_range("Sheet1", 'K', 0), "Sheet1!A2:K2");
        assert_eq!(row_range("Sheet1", 'K', 41), "Sheet1!A43:K43");
    }
}
