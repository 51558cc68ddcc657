//! The REST gateway and the token-carrying client. Fetch logic talks to a
//! [`LayerGateway`] trait object so tests can script responses without a
//! portal.

use crate::auth::{Authenticator, Session};
use crate::error::{FetchError, Result};
use log::warn;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

/// Transport seam between fetch logic and the portal.
pub trait LayerGateway {
    /// GET `url` with the given query parameters and parse the JSON body.
    fn get_json(&self, url: &str, params: &[(&str, String)], timeout: Option<Duration>)
        -> Result<Value>;

    /// Re-run the login flow, returning a fresh token. The gateway's
    /// session state (cookies) is replaced as a side effect.
    fn refresh_token(&self) -> Result<String>;
}

/// Real gateway over an authenticated portal session. Single-threaded by
/// design, so the session swap on re-login sits behind a `RefCell`.
pub struct HttpGateway {
    authenticator: Authenticator,
    session: RefCell<Session>,
}

impl HttpGateway {
    /// Authenticates once and wraps the resulting session.
    pub fn connect(authenticator: Authenticator) -> Result<Self> {
        let session = authenticator.authenticate()?;
        Ok(Self {
            authenticator,
            session: RefCell::new(session),
        })
    }

    pub fn token(&self) -> String {
        self.session.borrow().token.clone()
    }
}

impl LayerGateway for HttpGateway {
    fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let http = self.session.borrow().http.clone();
        let mut request = http.get(url).query(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send()?.json()?)
    }

    fn refresh_token(&self) -> Result<String> {
        let session = self.authenticator.authenticate()?;
        let token = session.token.clone();
        *self.session.borrow_mut() = session;
        Ok(token)
    }
}

/// Client over a shared gateway plus the current bearer token. Holds no
/// per-layer accumulator: every fetch returns a fresh result.
pub struct GeoClient {
    gateway: Arc<dyn LayerGateway>,
    base_url: String,
    token: String,
}

impl GeoClient {
    /// Logs in against the portal and binds the client to the REST base
    /// URL of the deployment's Geocortex app.
    pub fn connect(authenticator: Authenticator) -> Result<Self> {
        let base_url = authenticator.urls().app.clone();
        let gateway = HttpGateway::connect(authenticator)?;
        let token = gateway.token();
        Ok(Self {
            gateway: Arc::new(gateway),
            base_url,
            token,
        })
    }

    /// Builds a client over an arbitrary gateway, for tests and alternate
    /// transports.
    pub fn with_gateway(
        gateway: Arc<dyn LayerGateway>,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replaces the expired token by re-running the whole login flow.
    pub fn refresh(&mut self) -> Result<()> {
        self.token = self.gateway.refresh_token()?;
        Ok(())
    }

    /// GET and parse, no inspection of the body.
    pub fn query(&self, url: &str, params: &[(&str, String)], timeout: Option<Duration>)
        -> Result<Value> {
        self.gateway.get_json(url, params, timeout)
    }

    /// GET and parse, classifying an `error` body as a rejected token.
    pub fn query_data(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let body = self.query(url, params, timeout)?;
        if body.get("error").is_some() {
            return Err(FetchError::TokenExpired(Box::new(body)));
        }
        Ok(body)
    }
}

/// Retry policy for token expiry: run `op`; on a rejected token,
/// re-authenticate once and retry the same operation once. A second
/// consecutive rejection, or any other error, is returned as is.
pub fn with_reauth<T>(client: &mut GeoClient, op: impl Fn(&GeoClient) -> Result<T>) -> Result<T> {
    match op(client) {
        Err(FetchError::TokenExpired(_)) => {
            warn!("token rejected, re-running the login flow");
            client.refresh()?;
            op(client)
        }
        other => other,
    }
}
