//! HTTPS uploader for the Nanome workspace API.
//!
//! - Login: `POST <login_url>` with JSON `{"login", "pass", "source"}`; the
//!   token is read from `results.token.value`.
//! - Upload: `POST <load_url>` multipart with the archive as part `file`,
//!   fields `load-in-headset=true` and `format=molz`, and a bearer token.
//!
//! Non-success statuses surface the HTTP reason phrase.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    AuthToken, Credentials, SceneUploader, UploadError, FORM_FILE_PART, FORM_FORMAT,
    FORM_LOAD_IN_HEADSET, LOGIN_SOURCE,
};
use crate::config::ExportConfig;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    login: &'a str,
    pass: &'a str,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    results: LoginResults,
}

#[derive(Debug, Deserialize)]
struct LoginResults {
    token: TokenValue,
}

#[derive(Debug, Deserialize)]
struct TokenValue {
    value: String,
}

/// Uploader for the Nanome workspace API.
#[derive(Debug, Clone)]
pub struct NanomeUploader {
    client: Client,
    login_url: String,
    load_url: String,
}

impl NanomeUploader {
    /// Create a new uploader with the given endpoints and request timeout.
    pub fn new(
        login_url: impl Into<String>,
        load_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(format!("could not build HTTP client: {e}")))?;
        Ok(Self {
            client,
            login_url: login_url.into(),
            load_url: load_url.into(),
        })
    }

    /// Create an uploader from the endpoints in `config`.
    pub fn from_config(config: &ExportConfig) -> Result<Self, UploadError> {
        Self::new(
            config.login_url.clone(),
            config.load_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_string()
}

fn transport(e: reqwest::Error) -> UploadError {
    UploadError::Transport(e.to_string())
}

fn parse_login(body: &[u8]) -> Result<AuthToken, UploadError> {
    let parsed: LoginResponse = serde_json::from_slice(body)
        .map_err(|e| UploadError::InvalidResponse(format!("login response: {e}")))?;
    Ok(AuthToken::new(parsed.results.token.value))
}

fn success(response: Response) -> Result<Response, (u16, String)> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err((status.as_u16(), reason(status)))
    }
}

#[async_trait]
impl SceneUploader for NanomeUploader {
    async fn login(&self, credentials: &Credentials) -> Result<AuthToken, UploadError> {
        let request = LoginRequest {
            login: credentials.login(),
            pass: credentials.password(),
            source: LOGIN_SOURCE,
        };

        let response = self
            .client
            .post(&self.login_url)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let response = success(response)
            .map_err(|(status, reason)| UploadError::LoginRejected { status, reason })?;

        let body = response.bytes().await.map_err(transport)?;
        parse_login(&body)
    }

    async fn upload(&self, archive: &Path, token: &AuthToken) -> Result<(), UploadError> {
        let bytes = tokio::fs::read(archive).await?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene.molz".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/zip")
            .map_err(transport)?;
        let form = Form::new()
            .text(FORM_LOAD_IN_HEADSET.0, FORM_LOAD_IN_HEADSET.1)
            .text(FORM_FORMAT.0, FORM_FORMAT.1)
            .part(FORM_FILE_PART, part);

        let response = self
            .client
            .post(&self.load_url)
            .bearer_auth(token.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        success(response)
            .map_err(|(status, reason)| UploadError::UploadRejected { status, reason })?;

        Ok(())
    }
}
