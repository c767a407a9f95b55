// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the run backend.
//!
//! Handles:
//! - API key and bearer authentication on every request
//! - Multipart upload of runs with their map snapshot
//! - Classification of transport and status failures into `NetworkError`

use crate::config::Config;
use crate::error::{AppError, DataResult, EmptyResult, NetworkError};
use crate::models::Run;
use crate::remote::dto::{CreateRunRequest, RunDto};
use crate::remote::{RemoteRunDataSource, RemoteSession};
use crate::session::BearerCredential;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::sync::Arc;

const API_KEY_HEADER: &str = "x-api-key";
const RUN_DATA_PART: &str = "RUN_DATA";
const MAP_PICTURE_PART: &str = "MAP_PICTURE";
const MAP_PICTURE_FILE_NAME: &str = "mappicture.jpg";

/// Run backend client.
#[derive(Clone)]
pub struct HttpRunClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    credential: Arc<BearerCredential>,
}

impl HttpRunClient {
    pub fn new(config: &Config, credential: Arc<BearerCredential>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            credential,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Attach API key and, when available, the bearer token.
    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(API_KEY_HEADER, &self.api_key);
        match self.credential.access_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> EmptyResult<NetworkError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.classify_failure(response).await)
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> DataResult<T, NetworkError> {
        if !response.status().is_success() {
            return Err(self.classify_failure(response).await);
        }

        response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse backend response");
            NetworkError::Serialization
        })
    }

    async fn classify_failure(&self, response: reqwest::Response) -> NetworkError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = NetworkError::from_status(status.as_u16());

        // Rate limit - retried by the next sync pass
        if error == NetworkError::TooManyRequests {
            tracing::warn!("Backend rate limit hit (429)");
        } else {
            tracing::warn!(
                status = status.as_u16(),
                body = %body,
                error = %error,
                "Backend request failed"
            );
        }

        error
    }
}

#[async_trait]
impl RemoteRunDataSource for HttpRunClient {
    async fn get_runs(&self) -> DataResult<Vec<Run>, NetworkError> {
        let request = self.authorize(self.http.get(self.url("/runs"))).await;
        let response = request.send().await.map_err(NetworkError::from)?;

        let dtos: Vec<RunDto> = self.check_response_json(response).await?;
        dtos.into_iter().map(Run::try_from).collect()
    }

    async fn post_run(&self, run: &Run, map_picture: &[u8]) -> DataResult<Run, NetworkError> {
        let request_body = CreateRunRequest::try_from(run)?;
        let run_data =
            serde_json::to_string(&request_body).map_err(|_| NetworkError::Serialization)?;

        let picture = Part::bytes(map_picture.to_vec())
            .file_name(MAP_PICTURE_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|_| NetworkError::Serialization)?;
        let form = Form::new()
            .text(RUN_DATA_PART, run_data)
            .part(MAP_PICTURE_PART, picture);

        let request = self
            .authorize(self.http.post(self.url("/run")).multipart(form))
            .await;
        let response = request.send().await.map_err(NetworkError::from)?;

        let dto: RunDto = self.check_response_json(response).await?;
        Run::try_from(dto)
    }

    async fn delete_run(&self, id: &str) -> EmptyResult<NetworkError> {
        let request = self
            .authorize(self.http.delete(self.url("/run")).query(&[("id", id)]))
            .await;
        let response = request.send().await.map_err(NetworkError::from)?;

        self.check_response(response).await
    }
}

#[async_trait]
impl RemoteSession for HttpRunClient {
    async fn logout(&self) -> EmptyResult<NetworkError> {
        let request = self.authorize(self.http.get(self.url("/logout"))).await;
        let response = request.send().await.map_err(NetworkError::from)?;

        self.check_response(response).await?;
        tracing::info!("Backend logout successful");
        Ok(())
    }

    fn clear_credential(&self) {
        self.credential.clear();
    }
}
