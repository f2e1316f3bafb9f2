//! In-process fake of the S3 XML API, as spoken by S3 and GCS, for adapter
//! tests.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use quick_xml::escape::escape;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::form_urlencoded;

/// Fixed modification time reported for every object.
const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";
const META_PREFIX: &str = "x-amz-meta-";
const COPY_SOURCE: &str = "x-amz-copy-source";

/// Which backend the fake imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    S3,
    Gcs,
}

impl Flavor {
    /// Region a correctly configured client signs for.
    fn signing_region(self) -> &'static str {
        match self {
            Flavor::S3 => "us-east-1",
            Flavor::Gcs => "auto",
        }
    }
}

/// Deterministic test payload.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    meta: Vec<(String, String)>,
    etag: String,
}

struct PendingMultipart {
    key: String,
    content_type: String,
    meta: Vec<(String, String)>,
    parts: BTreeMap<u32, Bytes>,
}

struct FakeState {
    flavor: Flavor,
    bucket: String,
    endpoint: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    multipart: Mutex<HashMap<String, PendingMultipart>>,
    next_id: AtomicUsize,
    page_size: AtomicUsize,
    part_failure: Mutex<Option<StatusCode>>,
    gets: AtomicUsize,
    heads: AtomicUsize,
    single_puts: AtomicUsize,
    multipart_completions: AtomicUsize,
    multipart_aborts: AtomicUsize,
    parts_received: AtomicUsize,
}

/// A fake object store listening on a random local port.
pub struct FakeObjectStore {
    state: Arc<FakeState>,
}

impl FakeObjectStore {
    /// Start serving `bucket`. Requests for other buckets get `NoSuchBucket`.
    pub async fn start(flavor: Flavor, bucket: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(FakeState {
            flavor,
            bucket: bucket.to_string(),
            endpoint: format!("http://{}", addr),
            objects: Mutex::new(BTreeMap::new()),
            multipart: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            page_size: AtomicUsize::new(1000),
            part_failure: Mutex::new(None),
            gets: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
            single_puts: AtomicUsize::new(0),
            multipart_completions: AtomicUsize::new(0),
            multipart_aborts: AtomicUsize::new(0),
            parts_received: AtomicUsize::new(0),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state }
    }

    /// Base URL to configure as the adapter endpoint.
    pub fn endpoint(&self) -> String {
        self.state.endpoint.clone()
    }

    pub fn flavor(&self) -> Flavor {
        self.state.flavor
    }

    /// Object GET requests served, listings excluded.
    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    /// HEAD requests served, for objects and the bucket alike.
    pub fn heads(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }

    pub fn single_puts(&self) -> usize {
        self.state.single_puts.load(Ordering::SeqCst)
    }

    pub fn multipart_completions(&self) -> usize {
        self.state.multipart_completions.load(Ordering::SeqCst)
    }

    pub fn multipart_aborts(&self) -> usize {
        self.state.multipart_aborts.load(Ordering::SeqCst)
    }

    pub fn parts_received(&self) -> usize {
        self.state.parts_received.load(Ordering::SeqCst)
    }

    /// Maximum keys per listing page.
    pub fn set_page_size(&self, size: usize) {
        self.state.page_size.store(size, Ordering::SeqCst);
    }

    /// Answer every part upload with a bare `status`.
    pub fn fail_parts_with(&self, status: Option<StatusCode>) {
        *self.state.part_failure.lock().unwrap() = status;
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
        code,
        escape(message)
    );
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn xml_response(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

async fn handle(State(state): State<Arc<FakeState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    let query: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let path = parts.uri.path().trim_start_matches('/');
    let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
    let key = decode(key);

    if parts.method == Method::HEAD {
        state.heads.fetch_add(1, Ordering::SeqCst);
    }

    if !state.is_signed(&parts.headers, &query) {
        return error_response(StatusCode::FORBIDDEN, "AccessDenied", "Missing or foreign signature");
    }
    if decode(bucket) != state.bucket {
        return error_response(
            StatusCode::NOT_FOUND,
            "NoSuchBucket",
            "The specified bucket does not exist",
        );
    }

    match parts.method {
        Method::GET if query.contains_key("list-type") => state.list(&query),
        Method::GET => {
            state.gets.fetch_add(1, Ordering::SeqCst);
            match state.objects.lock().unwrap().get(&key) {
                Some(object) => {
                    let mut response = object_response(object, Body::from(object.data.clone()));
                    if let Some(disposition) = query.get("response-content-disposition") {
                        response.headers_mut().insert(
                            header::CONTENT_DISPOSITION,
                            HeaderValue::from_str(disposition).unwrap(),
                        );
                    }
                    response
                }
                None => no_such_key(),
            }
        }
        Method::HEAD if key.is_empty() => StatusCode::OK.into_response(),
        Method::HEAD => match state.objects.lock().unwrap().get(&key) {
            Some(object) => object_response(object, Body::empty()),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Method::PUT if query.contains_key("partNumber") => state.upload_part(&query, body),
        Method::PUT if parts.headers.contains_key(COPY_SOURCE) => state.copy(&parts.headers, key),
        Method::PUT => {
            let (content_type, meta) = upload_fields(&parts.headers);
            let etag = state.store(key, body, content_type, meta);
            state.single_puts.fetch_add(1, Ordering::SeqCst);
            (StatusCode::OK, [(header::ETAG, etag)]).into_response()
        }
        Method::POST if query.contains_key("uploads") => state.create_multipart(&parts.headers, key),
        Method::POST if query.contains_key("uploadId") => state.complete_multipart(&query, &body),
        Method::DELETE if query.contains_key("uploadId") => {
            state.multipart.lock().unwrap().remove(&query["uploadId"]);
            state.multipart_aborts.fetch_add(1, Ordering::SeqCst);
            StatusCode::NO_CONTENT.into_response()
        }
        Method::DELETE => {
            let removed = state.objects.lock().unwrap().remove(&key).is_some();
            if !removed && state.flavor == Flavor::Gcs {
                no_such_key()
            } else {
                StatusCode::NO_CONTENT.into_response()
            }
        }
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", "Unsupported"),
    }
}

fn no_such_key() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NoSuchKey",
        "The specified key does not exist.",
    )
}

fn object_response(object: &StoredObject, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&object.content_type).unwrap());
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.data.len()));
    headers.insert(header::ETAG, HeaderValue::from_str(&object.etag).unwrap());
    headers.insert(header::LAST_MODIFIED, HeaderValue::from_static(LAST_MODIFIED));
    for (name, value) in &object.meta {
        let name = format!("{}{}", META_PREFIX, name);
        headers.insert(
            header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    response
}

fn upload_fields(headers: &HeaderMap) -> (String, Vec<(String, String)>) {
    let content_type = header_str(headers, "content-type")
        .unwrap_or("application/octet-stream")
        .to_string();
    let meta = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();
    (content_type, meta)
}

impl FakeState {
    /// SigV4 in the header or the query string, scoped to the flavor's region.
    fn is_signed(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
        let scope = format!("/{}/s3/aws4_request", self.flavor.signing_region());
        let header_signed = header_str(headers, "authorization")
            .is_some_and(|auth| auth.starts_with("AWS4-HMAC-SHA256") && auth.contains(&scope));
        let query_signed = query.get("X-Amz-Algorithm").map(String::as_str) == Some("AWS4-HMAC-SHA256")
            && query.contains_key("X-Amz-Signature")
            && query
                .get("X-Amz-Credential")
                .is_some_and(|credential| credential.contains(&scope));
        header_signed || query_signed
    }

    fn next_id(&self) -> String {
        format!("upload-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn store(&self, key: String, data: Bytes, content_type: String, meta: Vec<(String, String)>) -> String {
        let etag = format!("\"{}\"", self.next_id());
        self.objects.lock().unwrap().insert(
            key,
            StoredObject {
                data,
                content_type,
                meta,
                etag: etag.clone(),
            },
        );
        etag
    }

    fn copy(&self, headers: &HeaderMap, to: String) -> Response {
        let source = header_str(headers, COPY_SOURCE).unwrap_or_default();
        let source = source.trim_start_matches('/');
        let from = source.split_once('/').map(|(_, key)| decode(key)).unwrap_or_default();

        let mut objects = self.objects.lock().unwrap();
        match objects.get(&from).cloned() {
            Some(object) => {
                objects.insert(to, object);
                xml_response(
                    "<CopyObjectResult><ETag>\"copy\"</ETag><LastModified>2015-10-21T07:28:00.000Z</LastModified></CopyObjectResult>"
                        .to_string(),
                )
            }
            None => no_such_key(),
        }
    }

    fn list(&self, query: &HashMap<String, String>) -> Response {
        let prefix = query.get("prefix").map(String::as_str).unwrap_or("");
        let after = query.get("continuation-token");
        let page_size = self.page_size.load(Ordering::SeqCst).max(1);

        let objects = self.objects.lock().unwrap();
        let matching: Vec<&String> = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| after.map_or(true, |token| key.as_str() > token.as_str()))
            .collect();
        let page = &matching[..matching.len().min(page_size)];
        let truncated = matching.len() > page.len();

        let mut body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><ListBucketResult><Name>{}</Name><Prefix>{}</Prefix><KeyCount>{}</KeyCount><IsTruncated>{}</IsTruncated>",
            escape(self.bucket.as_str()),
            escape(prefix),
            page.len(),
            truncated
        );
        for key in page {
            body.push_str(&format!(
                "<Contents><Key>{}</Key><Size>{}</Size></Contents>",
                escape(key.as_str()),
                objects[*key].data.len()
            ));
        }
        if let (true, Some(last)) = (truncated, page.last()) {
            body.push_str(&format!(
                "<NextContinuationToken>{}</NextContinuationToken>",
                escape(last.as_str())
            ));
        }
        body.push_str("</ListBucketResult>");
        xml_response(body)
    }

    fn create_multipart(&self, headers: &HeaderMap, key: String) -> Response {
        let (content_type, meta) = upload_fields(headers);
        let id = self.next_id();
        let body = format!(
            "<InitiateMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId></InitiateMultipartUploadResult>",
            escape(self.bucket.as_str()),
            escape(key.as_str()),
            id
        );
        self.multipart.lock().unwrap().insert(
            id,
            PendingMultipart {
                key,
                content_type,
                meta,
                parts: BTreeMap::new(),
            },
        );
        xml_response(body)
    }

    fn upload_part(&self, query: &HashMap<String, String>, body: Bytes) -> Response {
        if let Some(status) = *self.part_failure.lock().unwrap() {
            return status.into_response();
        }
        let number: u32 = match query["partNumber"].parse() {
            Ok(number) => number,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "InvalidArgument", "partNumber"),
        };
        let mut uploads = self.multipart.lock().unwrap();
        let Some(pending) = query.get("uploadId").and_then(|id| uploads.get_mut(id)) else {
            return error_response(StatusCode::NOT_FOUND, "NoSuchUpload", "Unknown upload");
        };
        pending.parts.insert(number, body);
        self.parts_received.fetch_add(1, Ordering::SeqCst);

        let mut response = StatusCode::OK.into_response();
        response.headers_mut().insert(
            header::ETAG,
            HeaderValue::from_str(&format!("\"part-{}\"", number)).unwrap(),
        );
        response
    }

    fn complete_multipart(&self, query: &HashMap<String, String>, body: &Bytes) -> Response {
        let Some(pending) = self.multipart.lock().unwrap().remove(&query["uploadId"]) else {
            return error_response(StatusCode::NOT_FOUND, "NoSuchUpload", "Unknown upload");
        };
        let listed = String::from_utf8_lossy(body);
        if pending
            .parts
            .keys()
            .any(|number| !listed.contains(&format!("<PartNumber>{}</PartNumber>", number)))
        {
            return error_response(StatusCode::BAD_REQUEST, "InvalidPart", "Part not listed");
        }

        let mut data = Vec::new();
        for part in pending.parts.values() {
            data.extend_from_slice(part);
        }
        let etag = self.store(pending.key, Bytes::from(data), pending.content_type, pending.meta);
        self.multipart_completions.fetch_add(1, Ordering::SeqCst);
        xml_response(format!(
            "<CompleteMultipartUploadResult><Bucket>{}</Bucket><ETag>{}</ETag></CompleteMultipartUploadResult>",
            escape(self.bucket.as_str()),
            escape(etag.as_str())
        ))
    }
}
