//! AWS SQS client using the HTTP query API.
//!
//! Requests are form-encoded `POST`s against the service endpoint carrying
//! `Action` and `Version=2012-11-05`; responses are XML. This keeps the
//! client small and lets tests point it at a mock HTTP server.
//!
//! ## Authentication
//!
//! When the configuration carries an access key and secret every request is
//! signed with AWS Signature Version 4. Without credentials requests are sent
//! unsigned, which local emulators such as ElasticMQ accept.
//!
//! ## Example
//!
//! ```no_run
//! use queue_facade::{ServiceConfiguration, SqsHttpClient};
//!
//! # fn example() -> Result<(), queue_facade::QueueError> {
//! let config = ServiceConfiguration::new("http://localhost:9324/queue/orders")
//!     .with_endpoint("http://localhost:9324");
//! let client = SqsHttpClient::new(&config)?;
//! # Ok(())
//! # }
//! ```

use super::model::*;
use super::{ClientFactory, SqsApi};
use crate::configuration::ServiceConfiguration;
use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use url::Url;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a form-encoded POST and return the headers to attach
    fn sign_request(
        &self,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers must be sorted by name
        let canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-amz-date:{}\n",
            FORM_CONTENT_TYPE, host, amz_date
        );
        let signed_headers = "content-type;host;x-amz-date";
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "POST\n{}\n\n{}\n{}\n{}",
            path, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date_stamp),
            string_to_sign.as_bytes(),
        ));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        vec![
            ("authorization", authorization),
            ("x-amz-date", amz_date),
            ("host", host.to_string()),
        ]
    }

    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============================================================================
// HTTP client
// ============================================================================

/// SQS client speaking the query protocol over HTTP
///
/// Cheap to clone; the underlying `reqwest` client pools connections.
#[derive(Clone)]
pub struct SqsHttpClient {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    endpoint: Url,
}

impl SqsHttpClient {
    /// Create a client for the endpoint, region and credentials in `configuration`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the endpoint cannot be parsed and
    /// `Connection` if the HTTP client cannot be built.
    pub fn new(configuration: &ServiceConfiguration) -> Result<Self, QueueError> {
        let endpoint_str = configuration.effective_endpoint();
        let endpoint = Url::parse(&endpoint_str).map_err(|e| {
            QueueError::invalid_configuration(format!(
                "could not parse endpoint '{}': {}",
                endpoint_str, e
            ))
        })?;

        let signer = configuration.has_credentials().then(|| {
            AwsV4Signer::new(
                configuration.access_key.clone(),
                configuration.secret.clone(),
                configuration.effective_region().to_string(),
            )
        });

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| QueueError::Connection {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            endpoint,
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST an action and return the parsed response document
    async fn call(
        &self,
        action: &str,
        params: Vec<(String, String)>,
    ) -> Result<XmlNode, QueueError> {
        let mut form = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
        ];
        form.extend(params);

        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header("content-type", FORM_CONTENT_TYPE);

        if let Some(signer) = &self.signer {
            let host = match (self.endpoint.host_str(), self.endpoint.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            };
            let headers = signer.sign_request(&host, self.endpoint.path(), &body, &Utc::now());
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        let response = request.body(body).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timeout: {}", e)
            } else if e.is_connect() {
                format!("could not connect: {}", e)
            } else {
                format!("HTTP request failed: {}", e)
            };
            QueueError::Connection { message }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| QueueError::Connection {
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(parse_error_response(&text, status.as_u16()));
        }

        parse_xml(&text)
    }
}

impl fmt::Debug for SqsHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsHttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

fn queue_url_param(queue_url: Option<String>) -> (String, String) {
    ("QueueUrl".to_string(), queue_url.unwrap_or_default())
}

fn push_opt<T: ToString>(params: &mut Vec<(String, String)>, key: String, value: Option<T>) {
    if let Some(value) = value {
        params.push((key, value.to_string()));
    }
}

#[async_trait]
impl SqsApi for SqsHttpClient {
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, QueueError> {
        let mut params = vec![
            queue_url_param(request.queue_url),
            (
                "MessageBody".to_string(),
                request.message_body.unwrap_or_default(),
            ),
        ];
        push_opt(&mut params, "DelaySeconds".into(), request.delay_seconds);
        push_opt(&mut params, "MessageGroupId".into(), request.message_group_id);
        push_opt(
            &mut params,
            "MessageDeduplicationId".into(),
            request.message_deduplication_id,
        );

        let doc = self.call("SendMessage", params).await?;
        parse_send_message(&doc)
    }

    async fn send_message_batch(
        &self,
        request: SendMessageBatchRequest,
    ) -> Result<SendMessageBatchResponse, QueueError> {
        let mut params = vec![queue_url_param(request.queue_url)];
        for (idx, entry) in request.entries.into_iter().enumerate() {
            let prefix = format!("SendMessageBatchRequestEntry.{}", idx + 1);
            params.push((format!("{}.Id", prefix), entry.id));
            params.push((format!("{}.MessageBody", prefix), entry.message_body));
            push_opt(&mut params, format!("{}.DelaySeconds", prefix), entry.delay_seconds);
            push_opt(
                &mut params,
                format!("{}.MessageGroupId", prefix),
                entry.message_group_id,
            );
            push_opt(
                &mut params,
                format!("{}.MessageDeduplicationId", prefix),
                entry.message_deduplication_id,
            );
        }

        let doc = self.call("SendMessageBatch", params).await?;
        Ok(SendMessageBatchResponse {
            successful: doc
                .descendants("SendMessageBatchResultEntry")
                .into_iter()
                .map(|entry| SendMessageBatchResultEntry {
                    id: entry.child_text("Id").unwrap_or_default(),
                    message_id: entry.child_text("MessageId").unwrap_or_default(),
                    md5_of_message_body: entry.child_text("MD5OfMessageBody"),
                })
                .collect(),
            failed: parse_batch_errors(&doc),
        })
    }

    async fn receive_message(
        &self,
        request: ReceiveMessageRequest,
    ) -> Result<ReceiveMessageResponse, QueueError> {
        let mut params = vec![queue_url_param(request.queue_url)];
        push_opt(
            &mut params,
            "MaxNumberOfMessages".into(),
            request.max_number_of_messages,
        );
        push_opt(&mut params, "WaitTimeSeconds".into(), request.wait_time_seconds);
        push_opt(
            &mut params,
            "VisibilityTimeout".into(),
            request.visibility_timeout,
        );

        let doc = self.call("ReceiveMessage", params).await?;
        Ok(ReceiveMessageResponse {
            messages: doc
                .descendants("Message")
                .into_iter()
                .map(|message| ReceivedMessage {
                    message_id: message.child_text("MessageId").unwrap_or_default(),
                    receipt_handle: message.child_text("ReceiptHandle").unwrap_or_default(),
                    body: message.child_text("Body").unwrap_or_default(),
                    md5_of_body: message.child_text("MD5OfBody"),
                })
                .collect(),
        })
    }

    async fn delete_message(
        &self,
        request: DeleteMessageRequest,
    ) -> Result<DeleteMessageResponse, QueueError> {
        let params = vec![
            queue_url_param(request.queue_url),
            ("ReceiptHandle".to_string(), request.receipt_handle),
        ];
        self.call("DeleteMessage", params).await?;
        Ok(DeleteMessageResponse {})
    }

    async fn delete_message_batch(
        &self,
        request: DeleteMessageBatchRequest,
    ) -> Result<DeleteMessageBatchResponse, QueueError> {
        let mut params = vec![queue_url_param(request.queue_url)];
        for (idx, entry) in request.entries.into_iter().enumerate() {
            let prefix = format!("DeleteMessageBatchRequestEntry.{}", idx + 1);
            params.push((format!("{}.Id", prefix), entry.id));
            params.push((format!("{}.ReceiptHandle", prefix), entry.receipt_handle));
        }

        let doc = self.call("DeleteMessageBatch", params).await?;
        Ok(DeleteMessageBatchResponse {
            successful: doc
                .descendants("DeleteMessageBatchResultEntry")
                .into_iter()
                .filter_map(|entry| entry.child_text("Id"))
                .collect(),
            failed: parse_batch_errors(&doc),
        })
    }

    async fn purge_queue(
        &self,
        request: PurgeQueueRequest,
    ) -> Result<PurgeQueueResponse, QueueError> {
        self.call("PurgeQueue", vec![queue_url_param(request.queue_url)])
            .await?;
        Ok(PurgeQueueResponse {})
    }

    async fn list_queues(&self, name_prefix: &str) -> Result<Vec<String>, QueueError> {
        let mut params = Vec::new();
        if !name_prefix.is_empty() {
            params.push(("QueueNamePrefix".to_string(), name_prefix.to_string()));
        }

        let doc = self.call("ListQueues", params).await?;
        Ok(doc
            .descendants("QueueUrl")
            .into_iter()
            .map(|node| node.text.trim().to_string())
            .collect())
    }
}

/// Factory that builds a new [`SqsHttpClient`] on every start
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory;

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn connect(
        &self,
        configuration: &ServiceConfiguration,
    ) -> Result<Arc<dyn SqsApi>, QueueError> {
        Ok(Arc::new(SqsHttpClient::new(configuration)?))
    }
}

// ============================================================================
// XML handling
// ============================================================================

/// Minimal element tree; SQS responses are small and shallow
///
/// Only leaf text is meaningful. Container nodes collect the formatting
/// whitespace between their children.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// All descendants named `name`, in document order
    fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.clone())
    }
}

fn parse_xml(xml: &str) -> Result<XmlNode, QueueError> {
    // Text is kept verbatim; message bodies may start or end with whitespace
    let mut reader = Reader::from_str(xml);

    let mut stack = vec![XmlNode::default()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(XmlNode {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Ok(Event::Empty(ref e)) => {
                let node = XmlNode {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| QueueError::Serialization {
                    message: format!("failed to unescape XML text: {}", e),
                })?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QueueError::Serialization {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    match stack.into_iter().next() {
        Some(root) => Ok(root),
        None => Err(QueueError::Serialization {
            message: "empty XML document".to_string(),
        }),
    }
}

fn parse_send_message(doc: &XmlNode) -> Result<SendMessageResponse, QueueError> {
    let result = doc
        .descendants("SendMessageResult")
        .into_iter()
        .next()
        .ok_or_else(|| QueueError::Serialization {
            message: "SendMessageResult not found in response".to_string(),
        })?;

    Ok(SendMessageResponse {
        message_id: result.child_text("MessageId").unwrap_or_default(),
        md5_of_message_body: result.child_text("MD5OfMessageBody"),
        sequence_number: result.child_text("SequenceNumber"),
    })
}

fn parse_batch_errors(doc: &XmlNode) -> Vec<BatchResultErrorEntry> {
    doc.descendants("BatchResultErrorEntry")
        .into_iter()
        .map(|entry| BatchResultErrorEntry {
            id: entry.child_text("Id").unwrap_or_default(),
            code: entry.child_text("Code").unwrap_or_default(),
            message: entry.child_text("Message"),
            sender_fault: entry
                .child_text("SenderFault")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        })
        .collect()
}

/// Map an SQS error document onto [`QueueError`]
fn parse_error_response(xml: &str, status_code: u16) -> QueueError {
    let error = parse_xml(xml)
        .ok()
        .and_then(|doc| {
            doc.descendants("Error").into_iter().next().map(|e| {
                (
                    e.child_text("Type"),
                    e.child_text("Code"),
                    e.child_text("Message"),
                )
            })
        })
        .unwrap_or((None, None, None));

    let (fault_type, code, message) = error;
    let code = code.unwrap_or_else(|| format!("HTTP{}", status_code));
    let message = message.unwrap_or_else(|| "unknown error".to_string());

    match code.as_str() {
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "InvalidSecurity"
        | "MissingAuthenticationToken"
        | "AccessDenied" => QueueError::Authentication {
            message: format!("{}: {}", code, message),
        },
        "Throttling" | "ThrottlingException" | "RequestThrottled" | "OverLimit" => {
            QueueError::Throttled { code, message }
        }
        _ if status_code == 401 || status_code == 403 => QueueError::Authentication {
            message: format!("{}: {}", code, message),
        },
        _ if status_code >= 500 || fault_type.as_deref() == Some("Receiver") => {
            QueueError::Provider { code, message }
        }
        _ => QueueError::InvalidRequest { code, message },
    }
}
