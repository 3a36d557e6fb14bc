use std::{future::Future, sync::Mutex, time::Duration};

use reqwest::{
    Client, Method, RequestBuilder, StatusCode,
    header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, ORIGIN, SET_COOKIE},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, UploadError};
use crate::rest_types::{
    CompleteUploadRequest, CompletedPartBody, CreateFileBody, CreateFileMeta, CreateFileRequest,
    FileMetadataBody, InitUploadRequest, InitUploadResponse,
};
use crate::session::{
    CommitResult, FinalizeRequest, Registration, RegistrationReceipt, UploadSession,
};

const INIT_UPLOAD_ROUTE: &str = "api/upload";
const COMPLETE_UPLOAD_ROUTE: &str = "api/upload/complete";
const CREATE_FILE_ROUTE: &str = "api/trpc/modelFile.create";
const AFFINITY_ROUTE: &str = "api/v1/models?limit=1";

const SESSION_COOKIE: &str = "__Secure-civitai-token";
const CSRF_COOKIE: &str = "__Host-next-auth.csrf-token";
pub const ROUTING_COOKIE: &str = "civitai-route";

pub const DEFAULT_BUCKET: &str = "civitai-delivery-worker-prod";
pub const DEFAULT_OBJECT_TYPE: &str = "Model";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FINALIZE_SUCCESS: [StatusCode; 3] =
    [StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT];
const REGISTRATION_SUCCESS_MARKER: &str = "result";

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub base_url: Url,
    /// Model page visited before initialize to pick up session affinity.
    pub model_id: Option<u64>,
    pub bucket: String,
    pub object_type: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct Credentials {
    pub session_token: String,
    pub csrf_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("session_token", &"<redacted>")
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server-assigned session affinity value, replayed verbatim on every platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingToken(String);

impl RoutingToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extracts the routing cookie from `Set-Cookie` headers; the last one wins.
pub fn routing_token_from(headers: &HeaderMap) -> Option<RoutingToken> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, value)| *name == ROUTING_COOKIE && !value.is_empty())
        .map(|(_, value)| RoutingToken::new(value))
        .last()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    pub filename: String,
    pub size: u64,
    pub object_type: String,
    pub parent_id: u64,
}

/// Point in the run at which session affinity is (re)established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareStage {
    Initialize { version_id: u64 },
    Finalize,
}

/// The remote calls that bracket the part uploads.
pub trait Handshake {
    /// Acquires or refreshes session affinity. Failures are tolerated.
    fn prepare(&self, _stage: PrepareStage) -> impl Future<Output = ()> {
        async {}
    }

    /// Told when a run stops before finalize. The session is left to expire
    /// server-side unless the platform offers a way to cancel it.
    fn abort(&self, _session: &UploadSession) -> impl Future<Output = ()> {
        async {}
    }

    fn initialize(&self, request: &InitializeRequest) -> impl Future<Output = Result<UploadSession>>;

    fn finalize(&self, request: &FinalizeRequest) -> impl Future<Output = Result<CommitResult>>;

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<RegistrationReceipt>>;
}

pub struct PlatformClient {
    client: Client,
    config: PlatformConfig,
    credentials: Credentials,
    routing: Mutex<Option<RoutingToken>>,
}

impl PlatformClient {
    pub fn new(mut config: PlatformConfig, credentials: Credentials) -> Result<Self> {
        // Routes are joined relative to the base, which drops its last
        // segment unless the path ends in a slash.
        if !config.base_url.path().ends_with('/') {
            let path = format!("{}/", config.base_url.path());
            config.base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("x-trpc-source", HeaderValue::from_static("react"));
        if let Ok(origin) = HeaderValue::from_str(&config.base_url.origin().ascii_serialization()) {
            headers.insert(ORIGIN, origin);
        }

        let client = Client::builder()
            .user_agent(concat!("mput/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UploadError::InvalidInput(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credentials,
            routing: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn routing_token(&self) -> Option<RoutingToken> {
        self.routing.lock().ok().and_then(|guard| guard.clone())
    }

    fn absorb_routing(&self, headers: &HeaderMap) {
        if let Some(token) = routing_token_from(headers)
            && let Ok(mut guard) = self.routing.lock()
        {
            if guard.as_ref() != Some(&token) {
                debug!("routing token updated");
            }
            *guard = Some(token);
        }
    }

    fn cookie_header(&self) -> String {
        let mut cookies = vec![format!("{}={}", SESSION_COOKIE, self.credentials.session_token)];
        if let Some(csrf) = &self.credentials.csrf_token {
            cookies.push(format!("{}={}", CSRF_COOKIE, csrf));
        }
        if let Some(route) = self.routing_token() {
            cookies.push(format!("{}={}", ROUTING_COOKIE, route.as_str()));
        }
        cookies.join("; ")
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        self.config
            .base_url
            .join(route)
            .map_err(|e| UploadError::InvalidInput(format!("Failed to construct {} URL: {}", route, e)))
    }

    fn affinity_url(&self, stage: PrepareStage) -> Result<Url> {
        match (stage, self.config.model_id) {
            (PrepareStage::Initialize { version_id }, Some(model_id)) => {
                let mut url = self.endpoint(&format!("models/{}", model_id))?;
                url.query_pairs_mut()
                    .append_pair("modelVersionId", &version_id.to_string());
                Ok(url)
            }
            _ => self.endpoint(AFFINITY_ROUTE),
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(COOKIE, self.cookie_header())
    }

    fn complete_request_body(&self, request: &FinalizeRequest) -> CompleteUploadRequest {
        CompleteUploadRequest {
            bucket: self.config.bucket.clone(),
            key: request.object_key.clone(),
            object_type: self.config.object_type.clone(),
            upload_id: request.session_id.clone(),
            parts: request
                .parts
                .iter()
                .map(|part| CompletedPartBody {
                    etag: part.integrity_token.clone(),
                    part_number: part.part_number,
                })
                .collect(),
        }
    }
}

fn create_file_body(registration: &Registration) -> CreateFileRequest {
    CreateFileRequest {
        json: CreateFileBody {
            authed: true,
            bucket: registration.bucket.clone(),
            key: registration.object_key.clone(),
            metadata: FileMetadataBody {
                format: registration.metadata.format.clone(),
                fp: registration.metadata.precision.clone(),
                size: registration.metadata.size_class.clone(),
            },
            model_version_id: registration.parent_version_id,
            name: registration.name.clone(),
            size_kb: registration.size_kb,
            object_type: registration.object_type.clone(),
            url: registration.url.clone(),
            uuid: registration.identity.clone(),
        },
        meta: CreateFileMeta::undefined_metadata(),
    }
}

impl Handshake for PlatformClient {
    async fn prepare(&self, stage: PrepareStage) {
        let url = match self.affinity_url(stage) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "skipping routing handshake");
                return;
            }
        };

        match self.request(Method::GET, url).send().await {
            Ok(response) => {
                self.absorb_routing(response.headers());
                if !response.status().is_success() {
                    warn!(status = %response.status(), "routing handshake returned an unexpected status");
                }
                info!(?stage, routed = self.routing_token().is_some(), "routing handshake complete");
            }
            Err(e) => warn!(error = %e, "routing handshake failed, continuing without affinity"),
        }
    }

    async fn initialize(&self, request: &InitializeRequest) -> Result<UploadSession> {
        let url = self.endpoint(INIT_UPLOAD_ROUTE)?;
        let body = InitUploadRequest {
            filename: request.filename.clone(),
            size: request.size,
            object_type: request.object_type.clone(),
            model_version_id: request.parent_id,
        };

        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Handshake(format!("initialize request failed: {}", e)))?;
        self.absorb_routing(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Handshake(format!(
                "initialize returned {} - {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let init_response: InitUploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Handshake(format!("malformed initialize response: {}", e)))?;
        let session = UploadSession::from_init_response(init_response, request.size)?;

        info!(
            upload_id = %session.session_id,
            key = %session.object_key,
            parts = session.part_count,
            "upload initialized"
        );
        Ok(session)
    }

    async fn finalize(&self, request: &FinalizeRequest) -> Result<CommitResult> {
        let url = self.endpoint(COMPLETE_UPLOAD_ROUTE)?;
        let body = self.complete_request_body(request);

        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Finalize(format!("complete request failed: {}", e)))?;
        self.absorb_routing(response.headers());

        let status = response.status();
        if !FINALIZE_SUCCESS.contains(&status) {
            return Err(UploadError::Finalize(format!(
                "complete returned {} - {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        info!(upload_id = %request.session_id, %status, "upload finalized");
        Ok(CommitResult {
            status: status.as_u16(),
        })
    }

    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt> {
        let url = self.endpoint(CREATE_FILE_ROUTE)?;
        let body = create_file_body(registration);

        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Registration(format!("create request failed: {}", e)))?;
        self.absorb_routing(response.headers());

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() || !text.contains(REGISTRATION_SUCCESS_MARKER) {
            return Err(UploadError::Registration(format!(
                "create returned {} - {}",
                status, text
            )));
        }

        info!(key = %registration.object_key, %status, "file registered");
        Ok(RegistrationReceipt {
            status: status.as_u16(),
            body: text,
        })
    }
}
