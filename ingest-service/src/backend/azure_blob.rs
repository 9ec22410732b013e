use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;

use super::common::{Backend, BackendError, BackendResult};
use super::credential::TokenCredential;

/// The REST API version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// A [`Backend`] for [Azure Blob Storage], using the REST API directly.
///
/// Objects are created as block blobs in a single container. Writes are conditional on the blob
/// not existing yet, so an existing key is never overwritten.
///
/// [Azure Blob Storage]: https://learn.microsoft.com/en-us/rest/api/storageservices/blob-service-rest-api
pub struct AzureBlobBackend {
    client: reqwest::Client,
    endpoint: Url,
    container: String,
    credential: Option<Arc<dyn TokenCredential>>,
}

impl AzureBlobBackend {
    /// Creates a backend for the container at the given service endpoint.
    ///
    /// The endpoint is the blob service URL of the storage account, such as
    /// `https://myaccount.blob.core.windows.net`. Without a credential, requests are sent
    /// unauthenticated, which is only useful for emulators and public containers.
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        container: &str,
        credential: Option<Arc<dyn TokenCredential>>,
    ) -> BackendResult<Self> {
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| BackendError::InvalidEndpoint(endpoint.to_owned()))?;

        Ok(Self {
            client,
            endpoint,
            container: container.to_owned(),
            credential,
        })
    }

    /// Returns the public endpoint of a storage account.
    pub fn account_endpoint(account: &str) -> String {
        format!("https://{account}.blob.core.windows.net")
    }

    fn url(&self, key: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.container);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        url
    }

    async fn authorize(&self, request: RequestBuilder) -> BackendResult<RequestBuilder> {
        let request = request.header("x-ms-version", API_VERSION);
        Ok(match self.credential {
            Some(ref credential) => request.bearer_auth(credential.token().await?),
            None => request,
        })
    }

    async fn list_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> BackendResult<EnumerationResults> {
        let mut request = self.client.get(self.url(None)).query(&[
            ("restype", "container"),
            ("comp", "list"),
            ("prefix", prefix),
        ]);
        if let Some(marker) = marker {
            request = request.query(&[("marker", marker)]);
        }

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("listing blobs", cause))?;
        let response = check_status("listing blobs", response).await?;

        let body = response
            .text()
            .await
            .map_err(|cause| BackendError::reqwest("reading blob listing", cause))?;
        parse_listing(&body)
    }
}

impl fmt::Debug for AzureBlobBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobBackend")
            .field("endpoint", &self.endpoint.as_str())
            .field("container", &self.container)
            .field("authenticated", &self.credential.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for AzureBlobBackend {
    fn name(&self) -> &'static str {
        "azure-blob"
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        payload: Bytes,
    ) -> BackendResult<()> {
        tracing::debug!("Writing to azure blob backend");
        let request = self
            .client
            .put(self.url(Some(key)))
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, content_type)
            .header(IF_NONE_MATCH, "*")
            .body(payload);

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("uploading blob", cause))?;

        // A conditional write on an existing blob is answered with 409 BlobAlreadyExists.
        if matches!(
            response.status(),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
        ) {
            return Err(BackendError::AlreadyExists { key: key.into() });
        }
        check_status("uploading blob", response).await?;

        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(?prefix), skip_all)]
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        tracing::debug!("Listing azure blob backend");
        let mut keys = Vec::new();
        let mut marker = None;

        loop {
            let (page_keys, next_marker) = self
                .list_page(prefix, marker.as_deref())
                .await?
                .into_parts();
            keys.extend(page_keys);

            marker = next_marker;
            if marker.is_none() {
                break;
            }
            tracing::trace!(?marker, "fetching next listing page");
        }

        Ok(keys)
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn get_object(&self, key: &str) -> BackendResult<Option<Bytes>> {
        tracing::debug!("Reading from azure blob backend");
        let request = self.client.get(self.url(Some(key)));
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("downloading blob", cause))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Object not found");
            return Ok(None);
        }
        let response = check_status("downloading blob", response).await?;

        let payload = response
            .bytes()
            .await
            .map_err(|cause| BackendError::reqwest("reading blob", cause))?;
        Ok(Some(payload))
    }
}

async fn check_status(
    context: &str,
    response: reqwest::Response,
) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // Azure reports the error code in a header, the XML body repeats it with a message.
    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    let message = match code {
        Some(code) if body.is_empty() => code,
        Some(code) => format!("{code}: {}", body.trim()),
        None => body.trim().to_owned(),
    };

    Err(BackendError::Status {
        context: context.to_owned(),
        status,
        message,
    })
}

/// One page of a `List Blobs` response.
#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: Option<Blobs>,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

impl EnumerationResults {
    /// Splits the page into blob names and the continuation marker, if there is another page.
    fn into_parts(self) -> (Vec<String>, Option<String>) {
        let keys = self
            .blobs
            .into_iter()
            .flat_map(|blobs| blobs.blob)
            .map(|blob| blob.name)
            .collect();
        let marker = self.next_marker.filter(|m| !m.is_empty());
        (keys, marker)
    }
}

fn parse_listing(body: &str) -> BackendResult<EnumerationResults> {
    // The service prefixes its XML documents with a byte order mark.
    let body = body.trim_start_matches('\u{feff}');
    Ok(quick_xml::de::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const PAGE_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="items">
  <Prefix>sensors/</Prefix>
  <Blobs>
    <Blob>
      <Name>sensors/a.json</Name>
      <Properties>
        <Content-Length>31</Content-Length>
        <BlobType>BlockBlob</BlobType>
      </Properties>
    </Blob>
    <Blob>
      <Name>sensors/b.json</Name>
      <Properties />
    </Blob>
  </Blobs>
  <NextMarker>page-two</NextMarker>
</EnumerationResults>"#;

    const PAGE_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="items">
  <Prefix>sensors/</Prefix>
  <Marker>page-two</Marker>
  <Blobs>
    <Blob>
      <Name>sensors/c.json</Name>
    </Blob>
  </Blobs>
  <NextMarker />
</EnumerationResults>"#;

    const EMPTY_PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="items">
  <Prefix>sensors/</Prefix>
  <Blobs />
  <NextMarker />
</EnumerationResults>"#;

    fn backend(server: &MockServer) -> AzureBlobBackend {
        AzureBlobBackend::new(reqwest::Client::new(), &server.uri(), "items", None).unwrap()
    }

    #[test]
    fn parses_listing_with_byte_order_mark() {
        let body = format!("\u{feff}{PAGE_ONE}");
        let (keys, marker) = parse_listing(&body).unwrap().into_parts();

        assert_eq!(keys, ["sensors/a.json", "sensors/b.json"]);
        assert_eq!(marker.as_deref(), Some("page-two"));
    }

    #[test]
    fn parses_empty_listing() {
        let (keys, marker) = parse_listing(EMPTY_PAGE).unwrap().into_parts();

        assert!(keys.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn builds_blob_urls() {
        let backend = AzureBlobBackend::new(
            reqwest::Client::new(),
            &AzureBlobBackend::account_endpoint("account"),
            "items",
            None,
        )
        .unwrap();

        assert_eq!(
            backend.url(Some("my folder/a.json")).as_str(),
            "https://account.blob.core.windows.net/items/my%20folder/a.json"
        );
    }

    #[tokio::test]
    async fn uploads_conditionally() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/items/sensors/a.json"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("if-none-match", "*"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)
            .put_object("sensors/a.json", "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_conflict_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(409).insert_header("x-ms-error-code", "BlobAlreadyExists"),
            )
            .mount(&server)
            .await;

        let result = backend(&server)
            .put_object("sensors/a.json", "application/json", Bytes::from_static(b"{}"))
            .await;
        assert!(matches!(result, Err(BackendError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn upload_failure_carries_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ms-error-code", "AuthorizationPermissionMismatch"),
            )
            .mount(&server)
            .await;

        let error = backend(&server)
            .put_object("sensors/a.json", "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "uploading blob: unexpected status 403 Forbidden: AuthorizationPermissionMismatch"
        );
    }

    #[tokio::test]
    async fn lists_all_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("comp", "list"))
            .and(query_param("prefix", "sensors/"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_ONE))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("marker", "page-two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_TWO))
            .expect(1)
            .mount(&server)
            .await;

        let keys = backend(&server).list_keys("sensors/").await.unwrap();
        assert_eq!(keys, ["sensors/a.json", "sensors/b.json", "sensors/c.json"]);
    }

    #[tokio::test]
    async fn downloads_blobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/sensors/a.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"a"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items/sensors/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let payload = backend.get_object("sensors/a.json").await.unwrap();
        assert_eq!(payload.unwrap(), r#"{"name":"a"}"#);
        assert!(backend.get_object("sensors/missing.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn network_failure_names_cause() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            AzureBlobBackend::new(reqwest::Client::new(), &format!("http://{addr}"), "items", None)
                .unwrap();

        let error = backend.list_keys("sensors/").await.unwrap_err();
        assert!(matches!(error, BackendError::Reqwest { .. }));
        assert!(
            error
                .to_string()
                .starts_with("reqwest error: listing blobs: error sending request")
        );
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        #[derive(Debug)]
        struct Fixed;

        #[async_trait::async_trait]
        impl TokenCredential for Fixed {
            async fn token(&self) -> BackendResult<String> {
                Ok("fixed-token".into())
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer fixed-token"))
            .and(header("x-ms-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AzureBlobBackend::new(
            reqwest::Client::new(),
            &server.uri(),
            "items",
            Some(Arc::new(Fixed)),
        )
        .unwrap();
        assert!(backend.list_keys("sensors/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_identity_fails_before_request() {
        #[derive(Debug)]
        struct NoIdentity;

        #[async_trait::async_trait]
        impl TokenCredential for NoIdentity {
            async fn token(&self) -> BackendResult<String> {
                Err(BackendError::Credential(azure_core::Error::message(
                    azure_core::error::ErrorKind::Credential,
                    "no identity assigned",
                )))
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_PAGE))
            .expect(0)
            .mount(&server)
            .await;

        let backend = AzureBlobBackend::new(
            reqwest::Client::new(),
            &server.uri(),
            "items",
            Some(Arc::new(NoIdentity)),
        )
        .unwrap();

        let error = backend.list_keys("sensors/").await.unwrap_err();
        assert!(matches!(error, BackendError::Credential(_)));
        assert!(error.to_string().contains("no identity assigned"));
    }
}
