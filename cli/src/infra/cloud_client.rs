//! Infrastructure implementation of the `CloudClient` and `ClientFactory`
//! ports over the control plane's JSON REST API.

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use stratus_common::{
    ApplicationStats, CloudApplication, CloudDomain, CloudInfo, CloudService, DebugMode,
    InstancesInfo, ResourceFingerprint, ServiceOffering, Staging, StartingInfo,
};
use tracing::{debug, warn};

use crate::application::ports::{ClientFactory, CloudClient};
use crate::domain::{CloudError, Credentials, Upload, UploadPayload};
use crate::infra::archive::pack_entries;

/// Response header naming the staging log of a start request.
const STAGING_LOG_HEADER: &str = "x-app-staging-log";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the control plane.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

fn transport(err: &reqwest::Error) -> CloudError {
    CloudError::Transport(err.to_string())
}

fn build_http(proxy: Option<&str>) -> Result<reqwest::Client, CloudError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("stratus/", env!("CARGO_PKG_VERSION")));
    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| CloudError::Transport(format!("invalid proxy {url}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| transport(&e))
}

/// Map a non-success response to a `CloudError`.
async fn check(response: Response) -> Result<Response, CloudError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let description = body.description.unwrap_or_else(|| {
        if text.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            text.trim().to_string()
        }
    });
    Err(CloudError::Http {
        status: status.as_u16(),
        code: body.code,
        description,
    })
}

/// HTTP client for one control-plane endpoint and user.
pub struct HttpCloudClient {
    base: String,
    credentials: Credentials,
    http: RwLock<reqwest::Client>,
    proxy: RwLock<Option<String>>,
    token: RwLock<Option<String>>,
}

impl HttpCloudClient {
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(url: &str, credentials: Credentials) -> Result<Self, CloudError> {
        Ok(Self {
            base: url.trim_end_matches('/').to_string(),
            credentials,
            http: RwLock::new(build_http(None)?),
            proxy: RwLock::new(None),
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let http = self.http.read().clone();
        let mut builder = http.request(method, format!("{}{path}", self.base));
        if let Some(token) = self.token.read().as_deref() {
            builder = builder.header(reqwest::header::AUTHORIZATION, token);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, CloudError> {
        let response = builder.send().await.map_err(|e| transport(&e))?;
        debug!(status = %response.status(), url = %response.url(), "control plane response");
        check(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CloudError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        response.json().await.map_err(|e| transport(&e))
    }

    async fn put_json(&self, path: &str, body: serde_json::Value) -> Result<Response, CloudError> {
        self.send(self.request(Method::PUT, path).json(&body)).await
    }

    async fn set_state(
        &self,
        name: &str,
        state: &str,
        debug: Option<DebugMode>,
    ) -> Result<Response, CloudError> {
        let mut builder = self
            .request(Method::PUT, &format!("/apps/{name}"))
            .json(&json!({ "state": state }));
        if let Some(mode) = debug {
            builder = builder.query(&[("debug", mode.as_str())]);
        }
        self.send(builder).await
    }

    fn starting_info(response: &Response) -> StartingInfo {
        StartingInfo {
            staging_file: response
                .headers()
                .get(STAGING_LOG_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    async fn upload_bytes(upload: &Upload) -> Result<Vec<u8>, CloudError> {
        match &upload.payload {
            UploadPayload::Bytes(bytes) => Ok(bytes.clone()),
            UploadPayload::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || std::fs::read(&path))
                    .await
                    .map_err(|e| CloudError::Transport(format!("upload task failed: {e}")))?
                    .map_err(|e| CloudError::Transport(format!("cannot read archive: {e}")))
            }
            UploadPayload::Entries(entries) => {
                let entries = entries.clone();
                tokio::task::spawn_blocking(move || pack_entries(&entries))
                    .await
                    .map_err(|e| CloudError::Transport(format!("upload task failed: {e}")))?
                    .map_err(|e| CloudError::Transport(format!("cannot pack archive: {e:#}")))
            }
        }
    }
}

impl CloudClient for HttpCloudClient {
    async fn login(&self) -> Result<(), CloudError> {
        let path = format!("/users/{}/tokens", self.credentials.username);
        let body = json!({ "password": self.credentials.password });
        let response = self
            .send(self.request(Method::POST, &path).json(&body))
            .await?;
        let token: TokenResponse = response.json().await.map_err(|e| transport(&e))?;
        *self.token.write() = Some(token.token);
        Ok(())
    }

    async fn info(&self) -> Result<CloudInfo, CloudError> {
        self.get_json("/info").await
    }

    async fn get_application(&self, name: &str) -> Result<CloudApplication, CloudError> {
        self.get_json(&format!("/apps/{name}")).await
    }

    async fn get_applications(&self) -> Result<Vec<CloudApplication>, CloudError> {
        self.get_json("/apps").await
    }

    async fn create_application(
        &self,
        name: &str,
        staging: &Staging,
        memory: u32,
        uris: &[String],
        services: &[String],
    ) -> Result<(), CloudError> {
        let body = json!({
            "name": name,
            "staging": staging,
            "memory": memory,
            "instances": 1,
            "uris": uris,
            "services": services,
        });
        self.send(self.request(Method::POST, "/apps").json(&body))
            .await
            .map(drop)
    }

    async fn match_resources(
        &self,
        resources: &[ResourceFingerprint],
    ) -> Result<Vec<ResourceFingerprint>, CloudError> {
        let response = self
            .send(self.request(Method::POST, "/resources").json(resources))
            .await?;
        response.json().await.map_err(|e| transport(&e))
    }

    async fn upload_application(&self, name: &str, upload: &Upload) -> Result<(), CloudError> {
        let bytes = Self::upload_bytes(upload).await?;
        let resources = serde_json::to_string(&upload.resources)
            .map_err(|e| CloudError::Transport(format!("cannot encode resources: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("resources", resources)
            .part(
                "application",
                reqwest::multipart::Part::bytes(bytes).file_name("application.tar.gz"),
            );
        self.send(
            self.request(Method::PUT, &format!("/apps/{name}/application"))
                .multipart(form),
        )
        .await
        .map(drop)
    }

    async fn start_application(&self, name: &str) -> Result<StartingInfo, CloudError> {
        let response = self.set_state(name, "STARTED", None).await?;
        Ok(Self::starting_info(&response))
    }

    async fn stop_application(&self, name: &str) -> Result<(), CloudError> {
        self.set_state(name, "STOPPED", None).await.map(drop)
    }

    async fn debug_application(
        &self,
        name: &str,
        mode: DebugMode,
    ) -> Result<StartingInfo, CloudError> {
        let response = self.set_state(name, "STARTED", Some(mode)).await?;
        Ok(Self::starting_info(&response))
    }

    async fn update_application_instances(
        &self,
        name: &str,
        instances: u32,
    ) -> Result<(), CloudError> {
        self.put_json(&format!("/apps/{name}"), json!({ "instances": instances }))
            .await
            .map(drop)
    }

    async fn update_application_memory(&self, name: &str, memory: u32) -> Result<(), CloudError> {
        self.put_json(&format!("/apps/{name}"), json!({ "memory": memory }))
            .await
            .map(drop)
    }

    async fn update_application_uris(&self, name: &str, uris: &[String]) -> Result<(), CloudError> {
        self.put_json(&format!("/apps/{name}"), json!({ "uris": uris }))
            .await
            .map(drop)
    }

    async fn update_application_services(
        &self,
        name: &str,
        services: &[String],
    ) -> Result<(), CloudError> {
        self.put_json(&format!("/apps/{name}"), json!({ "services": services }))
            .await
            .map(drop)
    }

    async fn get_application_stats(&self, name: &str) -> Result<ApplicationStats, CloudError> {
        self.get_json(&format!("/apps/{name}/stats")).await
    }

    async fn get_application_instances(&self, name: &str) -> Result<InstancesInfo, CloudError> {
        self.get_json(&format!("/apps/{name}/instances")).await
    }

    async fn get_staging_logs(
        &self,
        staging_file: &str,
        offset: u64,
    ) -> Result<Option<String>, CloudError> {
        let url = if staging_file.starts_with("http") {
            staging_file.to_string()
        } else {
            format!("{}/{}", self.base, staging_file.trim_start_matches('/'))
        };
        let offset = offset.to_string();
        let http = self.http.read().clone();
        let mut builder = http
            .get(url)
            .query(&[("tail", "true"), ("tail_offset", offset.as_str())]);
        if let Some(token) = self.token.read().as_deref() {
            builder = builder.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = builder.send().await.map_err(|e| transport(&e))?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::RANGE_NOT_SATISFIABLE
        ) {
            return Ok(None);
        }
        let text = check(response)
            .await?
            .text()
            .await
            .map_err(|e| transport(&e))?;
        Ok((!text.is_empty()).then_some(text))
    }

    async fn delete_application(&self, name: &str) -> Result<(), CloudError> {
        self.send(self.request(Method::DELETE, &format!("/apps/{name}")))
            .await
            .map(drop)
    }

    async fn get_services(&self) -> Result<Vec<CloudService>, CloudError> {
        self.get_json("/services").await
    }

    async fn create_service(&self, service: &CloudService) -> Result<(), CloudError> {
        self.send(self.request(Method::POST, "/services").json(service))
            .await
            .map(drop)
    }

    async fn delete_service(&self, name: &str) -> Result<(), CloudError> {
        self.send(self.request(Method::DELETE, &format!("/services/{name}")))
            .await
            .map(drop)
    }

    async fn get_service_offerings(&self) -> Result<Vec<ServiceOffering>, CloudError> {
        self.get_json("/info/services").await
    }

    async fn get_domains_for_org(&self) -> Result<Vec<CloudDomain>, CloudError> {
        self.get_json("/domains?scope=org").await
    }

    async fn get_domains(&self) -> Result<Vec<CloudDomain>, CloudError> {
        self.get_json("/domains").await
    }

    async fn register(&self, email: &str, password: &str) -> Result<(), CloudError> {
        let body = json!({ "email": email, "password": password });
        self.send(self.request(Method::POST, "/users").json(&body))
            .await
            .map(drop)
    }

    async fn update_password(&self, new_password: &str) -> Result<(), CloudError> {
        let path = format!("/users/{}", self.credentials.username);
        self.put_json(&path, json!({ "password": new_password }))
            .await
            .map(drop)
    }

    fn set_proxy(&self, proxy: Option<&str>) {
        if self.proxy.read().as_deref() == proxy {
            return;
        }
        match build_http(proxy) {
            Ok(http) => {
                *self.http.write() = http;
                *self.proxy.write() = proxy.map(str::to_string);
            }
            Err(e) => warn!(error = %e, "keeping previous proxy settings"),
        }
    }
}

/// Builds `HttpCloudClient`s; the production `ClientFactory`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    type Client = HttpCloudClient;

    fn create(&self, url: &str, credentials: &Credentials) -> Result<HttpCloudClient, CloudError> {
        HttpCloudClient::new(url, credentials.clone())
    }
}
