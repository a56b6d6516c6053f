use std::collections::BTreeSet;
use std::fmt;

use futures_util::future::BoxFuture;
use reqwest::Url;
use tracing::{debug, info, warn};

use super::forms::{has_password_field, parse_forms, PortalForm};
use crate::configs::AtsConfig;
use crate::errors::{CollarError, Result};
use crate::ingestors::read_table_str;
use crate::retrieve::ky_http::{describe_error, error_status, ApiClient, ApiResponse, ClientOptions};
use crate::tables::RawTable;

/// Portal login. Passed in explicitly, never read from the environment here.
#[derive(Clone, PartialEq, Eq)]
pub struct AtsCredentials {
    pub usr: String,
    pub pwd: String,
}

impl AtsCredentials {
    pub fn new(usr: impl Into<String>, pwd: impl Into<String>) -> Self {
        Self {
            usr: usr.into(),
            pwd: pwd.into(),
        }
    }
}

impl fmt::Debug for AtsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtsCredentials")
            .field("usr", &self.usr)
            .field("pwd", &"*****")
            .finish()
    }
}

/// Where a session stands.
///
/// `Authenticated -> Triggered -> Retrieved`, with `Failed` reachable from
/// any network step. Only `Authenticated` and `Retrieved` accept a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Authenticated,
    Triggered,
    Retrieved,
    Failed,
}

impl SessionPhase {
    fn name(self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Triggered => "triggered",
            Self::Retrieved => "retrieved",
            Self::Failed => "failed",
        }
    }
}

struct PendingDownload {
    action_id: String,
    response: ApiResponse,
}

/// An authenticated portal session.
///
/// Holds the cookie jar and the action ids seen on the export page. Exists
/// only after a successful login and must be ended with
/// [`SourceSession::release`]. Methods take `&mut self`, so triggers on one
/// session are serialised by construction.
///
/// Dropping a session does not log out, it only warns. Callers that may bail
/// out early should go through [`with_session`] or [`fetch_export`], which
/// release the session on every path.
pub struct SourceSession {
    client: ApiClient,
    config: AtsConfig,
    phase: SessionPhase,
    known_actions: BTreeSet<String>,
    pending: Option<PendingDownload>,
    released: bool,
}

impl fmt::Debug for SourceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSession")
            .field("base_url", &self.client.base_url().as_str())
            .field("phase", &self.phase)
            .field("known_actions", &self.known_actions)
            .finish()
    }
}

impl SourceSession {
    /// Logs in to the portal at `base_url`.
    ///
    /// The login page is fetched first so its hidden fields go back with the
    /// credentials.
    ///
    /// # Errors
    /// - [`CollarError::Auth`] when the portal answers 401/403, shows the
    ///   configured failure marker, or serves the login form again.
    /// - [`CollarError::Source`] for any other transport failure or non-2xx.
    ///
    /// No session exists after an error; its cookies are dropped with it.
    pub async fn authenticate(credentials: &AtsCredentials, base_url: &str, config: &AtsConfig) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let options = ClientOptions {
            timeout: config.timeout(),
            cookie_store: true,
        };
        let client = ApiClient::new(&base_url, &options)?;

        info!(base_url = %base_url, usr = %credentials.usr, "Logging in to ATS portal");
        let login_page = checked(client.get(client.endpoint(&config.login_path)?).await, "login page")?;
        let forms = parse_forms(&login_page.body)?;
        let form = forms
            .iter()
            .find(|f| f.password_fields.iter().any(|p| *p == config.password_field))
            .or_else(|| forms.first())
            .cloned()
            .unwrap_or_default();

        let mut login = form.clone();
        login.set_field(&config.user_field, &credentials.usr);
        login.set_field(&config.password_field, &credentials.pwd);
        let mut fields = login.fields;
        if let Some(control) = &config.login_control {
            let value = form
                .controls
                .iter()
                .find(|(name, _)| name == control)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| control.clone());
            fields.push((control.clone(), value));
        }

        let target = form_target(&login_page.final_url, &form)?;
        let response = client.post_form(target, &fields).await.map_err(|e| transport("login", &e))?;

        if matches!(response.status, 401 | 403) {
            return Err(CollarError::Auth(format!("portal answered {}", response.status)));
        }
        if !response.success {
            return Err(CollarError::source_error(
                Some(response.status),
                "login request failed",
            ));
        }
        if let Some(marker) = &config.failure_marker {
            if response.body.contains(marker.as_str()) {
                return Err(CollarError::Auth("portal reported a failed login".to_string()));
            }
        }
        if has_password_field(&parse_forms(&response.body)?, &config.password_field) {
            return Err(CollarError::Auth("portal served the login form again".to_string()));
        }

        info!(usr = %credentials.usr, "ATS session authenticated");
        Ok(Self {
            client,
            config: config.clone(),
            phase: SessionPhase::Authenticated,
            known_actions: BTreeSet::new(),
            pending: None,
            released: false,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Action ids found on the export page so far.
    pub fn known_actions(&self) -> &BTreeSet<String> {
        &self.known_actions
    }

    /// Submits the export control `action_id`.
    ///
    /// `action_id` is the portal's opaque control id, not the button label;
    /// see [`AtsConfig::resolve_action`] for the name table.
    ///
    /// # Errors
    /// - [`CollarError::InvalidSessionState`] unless the session is
    ///   authenticated or has finished a previous retrieve.
    /// - [`CollarError::Source`] when the export page has no such control; the
    ///   session stays usable. Transport failures also surface as `Source` and
    ///   leave the session failed.
    pub async fn trigger(&mut self, action_id: &str) -> Result<()> {
        if !matches!(self.phase, SessionPhase::Authenticated | SessionPhase::Retrieved) {
            return Err(CollarError::InvalidSessionState {
                expected: "authenticated or retrieved",
                found: self.phase.name(),
            });
        }

        let export_url = self.client.endpoint(&self.config.export_path)?;
        let outcome = self.client.get(export_url).await;
        let page = self.step(outcome, "export page")?;
        let forms = parse_forms(&page.body)?;
        self.known_actions
            .extend(forms.iter().flat_map(|f| f.action_ids().map(String::from)));

        let Some((form, fields)) = forms
            .iter()
            .find_map(|f| f.submission(action_id).map(|fields| (f, fields)))
        else {
            warn!(action_id, known = ?self.known_actions, "Unknown ATS action");
            return Err(CollarError::source_error(
                None,
                format!("export page has no control {:?}", action_id),
            ));
        };

        let target = form_target(&page.final_url, form)?;
        debug!(action_id, target = %target, "Triggering ATS action");
        let outcome = self.client.post_form(target, &fields).await;
        let response = self.step(outcome, "action")?;

        self.pending = Some(PendingDownload {
            action_id: action_id.to_string(),
            response,
        });
        self.phase = SessionPhase::Triggered;
        Ok(())
    }

    /// Fetches the file produced by the last trigger.
    ///
    /// With a configured download page the file is fetched from there;
    /// otherwise the action's own response is the file. A file holding only a
    /// header line is a valid empty table.
    ///
    /// # Errors
    /// [`CollarError::Source`] for a non-2xx answer, an empty body, or an HTML
    /// page where a file was expected.
    pub async fn retrieve(&mut self) -> Result<RawTable> {
        if self.phase != SessionPhase::Triggered {
            return Err(CollarError::InvalidSessionState {
                expected: "triggered",
                found: self.phase.name(),
            });
        }
        let Some(pending) = self.pending.take() else {
            return Err(CollarError::InvalidSessionState {
                expected: "triggered",
                found: self.phase.name(),
            });
        };

        let response = match self.config.download_path.clone() {
            Some(path) => {
                let url = self.client.endpoint(&path)?;
                let outcome = self.client.get(url).await;
                self.step(outcome, "download")?
            }
            None => pending.response,
        };

        match download_table(&response, &pending.action_id, &self.config) {
            Ok(table) => {
                info!(action_id = %pending.action_id, rows = table.len(), "ATS file retrieved");
                self.phase = SessionPhase::Retrieved;
                Ok(table)
            }
            Err(e) => {
                self.phase = SessionPhase::Failed;
                Err(e)
            }
        }
    }

    /// Logs out and ends the session.
    ///
    /// The session is consumed whatever the outcome.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let url = self.client.endpoint(&self.config.logout_path)?;
        let outcome = checked(self.client.get(url).await, "logout").map(|_| ());
        match &outcome {
            Ok(()) => debug!("ATS session released"),
            Err(e) => warn!(error = %e, "ATS logout failed"),
        }
        outcome
    }

    /// Like [`checked`], but marks the session failed on error.
    fn step(
        &mut self,
        outcome: reqwest_middleware::Result<ApiResponse>,
        what: &str,
    ) -> Result<ApiResponse> {
        let result = match outcome {
            Ok(response) => Ok(response),
            Err(e) => Err(transport(what, &e)),
        };
        if result.is_err() {
            self.phase = SessionPhase::Failed;
        }
        result
    }
}

impl Drop for SourceSession {
    fn drop(&mut self) {
        if !self.released {
            warn!(phase = self.phase.name(), "ATS session dropped without logout");
        }
    }
}

/// Logs in, runs `work` on the session and logs out again, whatever `work`
/// returned.
///
/// A failed logout after successful work is logged and the work's value is
/// still returned. An error from `work` wins over a logout error.
pub async fn with_session<T, F>(
    credentials: &AtsCredentials,
    base_url: &str,
    config: &AtsConfig,
    work: F,
) -> Result<T>
where
    F: for<'s> FnOnce(&'s mut SourceSession) -> BoxFuture<'s, Result<T>>,
{
    let mut session = SourceSession::authenticate(credentials, base_url, config).await?;
    let result = work(&mut session).await;

    let released = session.release().await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(value), Err(e)) => {
            warn!(error = %e, "Keeping ATS result despite failed logout");
            Ok(value)
        }
        (Err(e), _) => Err(e),
    }
}

/// Runs one complete portal export: login, trigger, retrieve, logout.
///
/// `action` may be a name from the action table or a raw control id. The
/// session is released on every path once login succeeded.
pub async fn fetch_export(
    credentials: &AtsCredentials,
    base_url: &str,
    action: &str,
    config: &AtsConfig,
) -> Result<RawTable> {
    let action_id = config.resolve_action(action).to_string();
    with_session(credentials, base_url, config, |session| {
        Box::pin(async move {
            session.trigger(&action_id).await?;
            session.retrieve().await
        })
    })
    .await
}

fn download_table(response: &ApiResponse, action_id: &str, config: &AtsConfig) -> Result<RawTable> {
    if !response.success {
        return Err(CollarError::source_error(
            Some(response.status),
            format!("download for {} failed", action_id),
        ));
    }
    let body = response.body.trim_start_matches('\u{feff}');
    if body.trim().is_empty() {
        return Err(CollarError::source_error(
            Some(response.status),
            format!("download for {} was empty", action_id),
        ));
    }
    let is_html = response
        .content_type()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
        || body.trim_start().starts_with('<');
    if is_html {
        return Err(CollarError::source_error(
            Some(response.status),
            format!("portal answered {} with a page instead of a file", action_id),
        ));
    }
    read_table_str(body, config.delimiter_byte()?, &format!("ats:{}", action_id))
}

fn form_target(page_url: &Url, form: &PortalForm) -> Result<Url> {
    match &form.action {
        None => Ok(page_url.clone()),
        Some(action) => page_url
            .join(action)
            .map_err(|e| CollarError::parse(page_url.as_str(), format!("bad form action {:?}: {}", action, e))),
    }
}

fn transport(what: &str, error: &reqwest_middleware::Error) -> CollarError {
    CollarError::source_error(error_status(error), format!("{} request failed: {}", what, describe_error(error)))
}

/// Maps transport failures and non-2xx answers to [`CollarError::Source`].
fn checked(outcome: reqwest_middleware::Result<ApiResponse>, what: &str) -> Result<ApiResponse> {
    let response = outcome.map_err(|e| transport(what, &e))?;
    if !response.success {
        return Err(CollarError::source_error(
            Some(response.status),
            format!("{} request failed", what),
        ));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

    fn response(status: u16, body: &str, content_type: &str) -> ApiResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        ApiResponse {
            status,
            success: (200..300).contains(&status),
            final_url: Url::parse("https://portal.example/download.aspx").unwrap(),
            headers,
            body: body.to_string(),
        }
    }

    #[test]
    fn download_parses_tab_separated_files() {
        let table = download_table(
            &response(200, "CollarSerialNumber\tLatitude\n123\t46.5\n", "text/plain"),
            "btn",
            &AtsConfig::default(),
        )
        .unwrap();
        assert_eq!(table.columns(), ["CollarSerialNumber", "Latitude"]);
        assert_eq!(table.source(), Some("ats:btn"));
    }

    #[test]
    fn header_only_file_is_empty_data_not_an_error() {
        let table = download_table(&response(200, "a,b\n", "text/csv"), "btn", &AtsConfig::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["a", "b"]);
    }

    #[test]
    fn empty_html_and_error_downloads_are_source_errors() {
        let config = AtsConfig::default();
        for bad in [
            response(200, "  \n", "text/csv"),
            response(200, "<html><body>Session expired</body></html>", "text/html; charset=utf-8"),
            response(500, "a,b\n1,2\n", "text/csv"),
        ] {
            assert!(matches!(
                download_table(&bad, "btn", &config),
                Err(CollarError::Source { .. })
            ));
        }
    }

    #[test]
    fn form_action_resolves_against_page() {
        let page = Url::parse("https://portal.example/app/login.aspx").unwrap();
        let form = PortalForm {
            action: Some("./login.aspx?ReturnUrl=x".to_string()),
            ..PortalForm::default()
        };
        assert_eq!(
            form_target(&page, &form).unwrap().as_str(),
            "https://portal.example/app/login.aspx?ReturnUrl=x"
        );
        assert_eq!(form_target(&page, &PortalForm::default()).unwrap(), page);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", AtsCredentials::new("ranger", "hunter2"));
        assert!(rendered.contains("ranger"));
        assert!(!rendered.contains("hunter2"));
    }
}
