//! Portal authentication: two sequential security layers, a credentialed
//! ASP.NET form and an OAuth-style sign-in, ending in a short-lived bearer
//! token. Tokens expire without notice; callers re-run the whole flow
//! reactively when a query is rejected.

use crate::error::{FetchError, Result};
use crate::html;
use log::{info, warn};

/// Attempts before a login failure is fatal. Each attempt redoes the full
/// flow from scratch with a fresh cookie jar.
pub const LOGIN_ATTEMPTS: usize = 3;

/// Credential pair for both security layers. The portal sign-in uses a
/// distinct account name from the first layer.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub portal_username: String,
    pub password: String,
}

/// The three endpoints the login flow walks through.
#[derive(Debug, Clone)]
pub struct PortalUrls {
    pub home: String,
    pub app: String,
    pub signin: String,
}

impl PortalUrls {
    /// Derives the standard layout from the deployment host, e.g.
    /// `https://arcgis.example.io/`.
    pub fn from_host(host: &str) -> Self {
        let host = host.strip_suffix('/').unwrap_or(host);
        Self {
            home: format!("{host}/"),
            app: format!("{host}/Geocortex/"),
            signin: format!("{host}/portal/sharing/oauth2/signin"),
        }
    }
}

/// An authenticated portal session: a cookie-holding HTTP client plus the
/// bearer token every data query must carry.
pub struct Session {
    pub http: reqwest::blocking::Client,
    pub token: String,
}

pub struct Authenticator {
    credentials: Credentials,
    urls: PortalUrls,
}

impl Authenticator {
    pub fn new(credentials: Credentials, urls: PortalUrls) -> Self {
        Self { credentials, urls }
    }

    pub fn urls(&self) -> &PortalUrls {
        &self.urls
    }

    /// Runs the full login flow, retrying from scratch up to
    /// [`LOGIN_ATTEMPTS`] times. Partial state from a failed attempt is
    /// discarded, never resumed.
    pub fn authenticate(&self) -> Result<Session> {
        let mut last_error = FetchError::Auth("login never attempted".to_string());
        for attempt in 1..=LOGIN_ATTEMPTS {
            match self.try_login() {
                Ok(session) => {
                    info!("logged in and retrieved map server token");
                    return Ok(session);
                }
                Err(err) => {
                    warn!("login attempt {attempt} failed: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn try_login(&self) -> Result<Session> {
        let http = reqwest::blocking::Client::builder()
            .cookie_store(true)
            // the portal TLS chain does not validate
            .danger_accept_invalid_certs(true)
            // paging queries run without a deadline; only the directory
            // listing sets a per-request timeout
            .timeout(None)
            .build()?;

        // Layer 1: the credentialed ASP.NET form on the home page.
        let home_page = http
            .get(&self.urls.home)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()?
            .text()?;
        let viewstate = login_field(&home_page, "__VIEWSTATE")?;
        let generator = login_field(&home_page, "__VIEWSTATEGENERATOR")?;
        let validation = login_field(&home_page, "__EVENTVALIDATION")?;
        let action = html::form_action(&home_page, "Form1")
            .ok_or_else(|| FetchError::Auth("no Form1 action on login page".to_string()))?;

        let form_url = format!("{}{action}", self.urls.home);
        http.post(&form_url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .form(&[
                ("__VIEWSTATE", viewstate.as_str()),
                ("__VIEWSTATEGENERATOR", generator.as_str()),
                ("__EVENTVALIDATION", validation.as_str()),
            ])
            .send()?;

        // Layer 2: the OAuth-style sign-in embedded in the app page.
        let app_page = http.get(&self.urls.app).send()?.text()?;
        let oauth_info = html::script_object(&app_page, "var oAuthInfo = ")
            .ok_or_else(|| FetchError::Auth("no oAuthInfo object on app page".to_string()))?;
        let oauth_info: serde_json::Value = serde_json::from_str(&oauth_info)?;
        let oauth_state = oauth_info
            .get("oauth_state")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| FetchError::Auth("oAuthInfo lacks oauth_state".to_string()))?;

        let signin_page = http
            .post(&self.urls.signin)
            .form(&[
                ("oauth_state", oauth_state),
                ("authorize", "true"),
                ("username", &self.credentials.portal_username),
                ("password", &self.credentials.password),
            ])
            .send()?
            .text()?;

        // The sign-in response carries the token in its form action,
        // after a "gcx-" prefix.
        let action = html::first_form_action(&signin_page)
            .ok_or_else(|| FetchError::Auth("no form on sign-in response".to_string()))?;
        let token = action
            .split_once("gcx-")
            .map(|(_, token)| token.to_string())
            .ok_or_else(|| FetchError::Auth("sign-in response carries no token".to_string()))?;

        Ok(Session { http, token })
    }
}

fn login_field(page: &str, name: &str) -> Result<String> {
    html::input_value(page, name)
        .ok_or_else(|| FetchError::Auth(format!("missing {name} field on login page")))
}
