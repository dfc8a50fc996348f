// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client for the inbox REST backend

use std::time::Duration;

use inboxcommon::identifiers::AppCode;
use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use url::{ParseError, Url};

pub mod inbox_api;

const HTTPS_BY_DEFAULT: bool = false;

#[derive(Error, Debug)]
pub enum ApiClientInitError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    #[error("Failed to parse URL {0}")]
    UrlParsingError(String),
}

pub type HttpClient = reqwest::Client;

/// Wrapper around a reqwest client, exposing one function per backend
/// endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: HttpClient,
    url: Url,
    app_code: AppCode,
}

impl ApiClient {
    /// Creates a new HTTP client.
    pub fn new_http_client() -> reqwest::Result<Client> {
        ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(4))
            .user_agent("InboxClient/0.1")
            .build()
    }

    pub fn with_default_http_client(
        domain: impl AsRef<str>,
        app_code: AppCode,
    ) -> Result<Self, ApiClientInitError> {
        let client = Self::new_http_client()?;
        Self::initialize(client, domain, app_code)
    }

    /// Creates a new API client that connects to the given base URL.
    ///
    /// If the URL carries no scheme, `http` is assumed unless
    /// `HTTPS_BY_DEFAULT` is set.
    pub fn initialize(
        client: HttpClient,
        domain: impl AsRef<str>,
        app_code: AppCode,
    ) -> Result<Self, ApiClientInitError> {
        let domain = domain.as_ref();
        let url = match Url::parse(domain) {
            Ok(url) => url,
            // Not a full URL, try to parse it as a hostname.
            Err(ParseError::RelativeUrlWithoutBase) => {
                let protocol = if HTTPS_BY_DEFAULT { "https" } else { "http" };
                let domain = format!("{protocol}://{domain}");
                Url::parse(&domain).map_err(|_| ApiClientInitError::UrlParsingError(domain))?
            }
            Err(_) => return Err(ApiClientInitError::UrlParsingError(domain.to_owned())),
        };
        Ok(Self {
            client,
            url,
            app_code,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn app_code(&self) -> &AppCode {
        &self.app_code
    }

    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url, ParseError> {
        self.url.join(endpoint)
    }
}
