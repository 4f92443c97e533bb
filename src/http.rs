//! HTTP API for uploads
//!
//! - `GET /health` - Health check
//! - `POST /upload` - Upload one file (multipart form, field `upload_param`)
//!
//! ## Example Usage
//!
//! ```bash
//! curl -F "file=@photo.png;type=image/png" http://localhost:8095/upload
//! # {"name":"3f2c...e1.png","original_name":"photo.png","extension":"png",
//! #  "type":"image/png","size":48211,"url":"/storage/temp/3f2c...e1.png"}
//! ```
//!
//! Failures are answered with `{"error": "..."}`.

use crate::config::Config;
use crate::error::StorageError;
use crate::response;
use crate::storage::Storage;
use crate::upload::{IncomingFile, UploadConstraints, UploadReceiver, UploadResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const INCORRECT_UPLOAD: &str = "Incorrect upload file";

/// HTTP server state
pub struct HttpServer<S: Storage + ?Sized> {
    receiver: Arc<UploadReceiver<S>>,
    constraints: UploadConstraints,
    upload_param: String,
    bind_addr: SocketAddr,
}

impl<S: Storage + ?Sized + 'static> HttpServer<S> {
    /// Create a new HTTP server
    pub fn new(
        receiver: Arc<UploadReceiver<S>>,
        constraints: UploadConstraints,
        upload_param: impl Into<String>,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            receiver,
            constraints,
            upload_param: upload_param.into(),
            bind_addr,
        }
    }

    pub fn from_config(
        storage: Arc<S>,
        config: &Config,
        bind_addr: SocketAddr,
    ) -> Result<Self, StorageError> {
        let receiver = UploadReceiver::from_config(storage, config)?;
        Ok(Self::new(
            Arc::new(receiver),
            UploadConstraints::from(&config.upload),
            config.upload.upload_param.clone(),
            bind_addr,
        ))
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let response = match (method, path.as_str()) {
            (Method::GET, "/health") => response::ok(&serde_json::json!({
                "status": "ok",
                "upload_param": self.upload_param,
            })),
            (Method::POST, "/upload") => {
                let content_type = req
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match req.collect().await {
                    Ok(body) => {
                        let (status, body) =
                            self.process_upload(content_type.as_deref(), body.to_bytes()).await;
                        upload_response(status, &body)
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read upload body");
                        response::internal_error("Failed to read body")
                    }
                }
            }
            (_, "/upload") => response::method_not_allowed("Only POST is allowed"),
            _ => response::not_found("Not Found"),
        };

        Ok(response)
    }

    /// Parse a multipart body and hand the file to the receiver
    pub async fn process_upload(
        &self,
        content_type: Option<&str>,
        body: Bytes,
    ) -> (StatusCode, UploadResponse) {
        let Some(boundary) = content_type.and_then(|ct| multer::parse_boundary(ct).ok()) else {
            return (StatusCode::BAD_REQUEST, UploadResponse::failure(INCORRECT_UPLOAD));
        };

        let file = match self.read_file_field(body, boundary).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                return (StatusCode::BAD_REQUEST, UploadResponse::failure(INCORRECT_UPLOAD))
            }
            Err(e) => {
                warn!(error = %e, "Malformed multipart body");
                return (StatusCode::BAD_REQUEST, UploadResponse::failure(INCORRECT_UPLOAD));
            }
        };

        let result = self.receiver.receive(file, &self.constraints).await;
        let status = match &result {
            Ok(_) => StatusCode::OK,
            Err(StorageError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, UploadResponse::from(result))
    }

    /// First part named `upload_param`; other fields are skipped
    async fn read_file_field(
        &self,
        body: Bytes,
        boundary: String,
    ) -> Result<Option<IncomingFile>, StorageError> {
        let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| StorageError::Multipart(e.to_string()))?
        {
            if field.name() != Some(self.upload_param.as_str()) {
                continue;
            }

            let original_name = field.file_name().unwrap_or_default().to_string();
            let mime_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| StorageError::Multipart(e.to_string()))?;

            return Ok(Some(IncomingFile {
                original_name,
                mime_type,
                data: data.to_vec(),
            }));
        }

        Ok(None)
    }
}

fn upload_response(status: StatusCode, body: &UploadResponse) -> Response<Full<Bytes>> {
    let mut response = response::json_response(status, body);
    if body.is_success() {
        response
            .headers_mut()
            .insert(header::VARY, header::HeaderValue::from_static("Accept"));
    }
    response
}
