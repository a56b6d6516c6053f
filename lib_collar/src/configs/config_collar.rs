use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CollarError, Result};

const VECTRONICS_BASE_URL: &str = "https://wombat.vectronic-wildlife.com:9443";
const ATS_BASE_URL: &str = "https://atsidaq.net/";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Root configuration, one section per source.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollarConfig {
    pub vectronics: VectronicsConfig,
    pub ats: AtsConfig,
    pub csv: CsvConfig,
}

impl CollarConfig {
    /// Parses configuration from JSON text. Missing sections and fields take
    /// their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CollarError::Config(e.to_string()))
    }

    /// Reads configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CollarError::io(path.display(), e))?;
        Self::from_json_str(&text)
    }
}

impl fmt::Display for CollarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CollarConfig
    Vectronics: {} (timeout {}s),
    ATS: {} (timeout {}s, {} actions),
    CSV delimiter: {:?}, identifier column: {}
",
            self.vectronics.base_url,
            self.vectronics.timeout_secs,
            self.ats.base_url,
            self.ats.timeout_secs,
            self.ats.actions.len(),
            self.csv.delimiter,
            self.csv.identifier_column
        )
    }
}

/// Vendor REST API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectronicsConfig {
    /// Scheme, host and port; the `/v2/collar/...` route is appended.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for VectronicsConfig {
    fn default() -> Self {
        Self {
            base_url: VECTRONICS_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl VectronicsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Web portal settings: where the forms live and what their fields are called.
///
/// Portal markup changes only ever touch this struct (paths, field names and
/// the action table), never the session state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtsConfig {
    pub base_url: String,
    /// Page holding the login form, relative to `base_url`.
    pub login_path: String,
    /// Page holding the export controls, relative to `base_url`.
    pub export_path: String,
    /// Page serving the generated file. Unset when the action's own response
    /// is the file.
    pub download_path: Option<String>,
    pub logout_path: String,
    /// Form field receiving the user name.
    pub user_field: String,
    /// Form field receiving the password.
    pub password_field: String,
    /// Name of the login submit control, when the portal requires it in the post.
    pub login_control: Option<String>,
    /// Text that only appears on a failed-login page.
    pub failure_marker: Option<String>,
    /// Human-facing export names mapped to the portal's opaque control ids.
    pub actions: BTreeMap<String, String>,
    /// Delimiter of downloaded files; sniffed when unset.
    pub delimiter: Option<char>,
    pub timeout_secs: u64,
}

impl Default for AtsConfig {
    fn default() -> Self {
        let actions = BTreeMap::from([
            (
                "download_new".to_string(),
                "ctl00$ContentPlaceHolder1$btnDownloadNew".to_string(),
            ),
            (
                "download_all".to_string(),
                "ctl00$ContentPlaceHolder1$btnDownloadAll".to_string(),
            ),
        ]);
        Self {
            base_url: ATS_BASE_URL.to_string(),
            login_path: "login.aspx".to_string(),
            export_path: "download.aspx".to_string(),
            download_path: None,
            logout_path: "logout.aspx".to_string(),
            user_field: "usr".to_string(),
            password_field: "pwd".to_string(),
            login_control: None,
            failure_marker: None,
            actions,
            delimiter: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Maps an export name to its control id. Names missing from the table
    /// are taken to be control ids already.
    pub fn resolve_action<'a>(&'a self, name_or_id: &'a str) -> &'a str {
        self.actions
            .get(name_or_id)
            .map(String::as_str)
            .unwrap_or(name_or_id)
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        delimiter_byte(self.delimiter)
    }
}

/// Flat-file defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvConfig {
    /// Field delimiter; sniffed per file when unset.
    pub delimiter: Option<char>,
    /// Column name used when tagging files with an identifier.
    pub identifier_column: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            identifier_column: "identifier".to_string(),
        }
    }
}

impl CsvConfig {
    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        delimiter_byte(self.delimiter)
    }
}

fn delimiter_byte(delimiter: Option<char>) -> Result<Option<u8>> {
    match delimiter {
        None => Ok(None),
        Some(c) if c.is_ascii() => Ok(Some(c as u8)),
        Some(c) => Err(CollarError::Config(format!(
            "delimiter {:?} is not a single ASCII character",
            c
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = CollarConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CollarConfig::default());
        assert_eq!(config.vectronics.base_url, VECTRONICS_BASE_URL);
        assert_eq!(config.ats.user_field, "usr");
        assert_eq!(config.ats.password_field, "pwd");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = CollarConfig::from_json_str(
            r#"{"ats": {"baseUrl": "http://localhost:8080/", "actions": {"latest": "btnLatest"}}}"#,
        )
        .unwrap();
        assert_eq!(config.ats.base_url, "http://localhost:8080/");
        assert_eq!(config.ats.login_path, "login.aspx");
        assert_eq!(config.ats.resolve_action("latest"), "btnLatest");
        assert_eq!(config.ats.resolve_action("raw$control"), "raw$control");
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let config = CsvConfig {
            delimiter: Some('§'),
            ..CsvConfig::default()
        };
        assert!(config.delimiter_byte().is_err());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            CollarConfig::from_json_str("{not json"),
            Err(CollarError::Config(_))
        ));
    }
}
