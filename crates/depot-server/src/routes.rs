//! URL routing and request handlers for the registry API subset depot serves.

use crate::statter::CachedBlobStatter;
use crate::{Registry, ServerError};
use depot_cache::BlobDescriptorService;
use depot_schema::{Descriptor, Digest};
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, error, info};
use url::Url;

#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/v2/`
    Base,
    /// `/health`
    Health,
    /// `/v2/{name}/blobs/{digest}`
    Blob { name: &'a str, digest: &'a str },
    /// `/v2/{name}/blobs/uploads/`
    Upload { name: &'a str },
}

/// Parse a request path (query string already stripped).
pub fn parse_route(path: &str) -> Option<Route<'_>> {
    match path {
        "/v2" | "/v2/" => return Some(Route::Base),
        "/health" => return Some(Route::Health),
        _ => {}
    }
    let rest = path.strip_prefix("/v2/")?;
    let (name, tail) = rest.rsplit_once("/blobs/")?;
    if name.is_empty() {
        return None;
    }
    match tail {
        "uploads" | "uploads/" => Some(Route::Upload { name }),
        "" => None,
        digest if !digest.contains('/') => Some(Route::Blob { name, digest }),
        _ => None,
    }
}

/// Resolve a request target (`/path?query`) into a full URL.
pub fn request_url(target: &str) -> Result<Url, ServerError> {
    Ok(Url::parse(&format!("http://localhost{target}"))?)
}

/// First form-urlencoded value for `key` in the query string.
pub fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn with_headers<R: Read>(mut resp: Response<R>, headers: &[(&str, &str)]) -> Response<R> {
    for (name, value) in headers {
        if let Some(h) = header(name, value) {
            resp.add_header(h);
        }
    }
    resp
}

fn respond<R: Read>(req: Request, resp: Response<R>) {
    if let Err(e) = req.respond(resp) {
        debug!("failed to send response: {e}");
    }
}

fn respond_json(req: Request, code: u16, json: &serde_json::Value) {
    let resp = Response::from_string(json.to_string()).with_status_code(StatusCode(code));
    respond(req, with_headers(resp, &[("Content-Type", "application/json")]));
}

fn respond_error(req: Request, err: &ServerError) {
    let code = err.status();
    if code >= 500 {
        error!("{} {}: {err}", req.method(), req.url());
    } else {
        debug!("{} {}: {err}", req.method(), req.url());
    }
    let body = serde_json::json!({
        "errors": [{ "code": err.code(), "message": err.to_string() }]
    });
    respond_json(req, code, &body);
}

fn respond_descriptor(req: Request, desc: &Descriptor, data: Option<Vec<u8>>) {
    let size = desc.size.to_string();
    let headers = [
        ("Content-Type", desc.media_type.as_str()),
        ("Docker-Content-Digest", desc.digest.as_str()),
    ];
    match data {
        Some(data) => respond(req, with_headers(Response::from_data(data), &headers)),
        None => {
            let resp = with_headers(Response::empty(200), &headers);
            respond(req, with_headers(resp, &[("Content-Length", size.as_str())]));
        }
    }
}

fn read_body(req: &mut Request) -> Result<Vec<u8>, ServerError> {
    let mut body = Vec::new();
    req.as_reader().read_to_end(&mut body)?;
    Ok(body)
}

fn handle_blob(registry: &Registry, req: Request, name: &str, digest: &str) {
    let scope = match registry.scope(name) {
        Ok(scope) => scope,
        Err(e) => return respond_error(req, &e),
    };
    let digest = Digest::new(digest);
    let statter = CachedBlobStatter::new(
        scope.cache.as_ref().map(|c| c as &dyn BlobDescriptorService),
        registry.store(),
        &scope.repo,
    );

    match *req.method() {
        Method::Head => match statter.stat(&digest) {
            Ok(desc) => respond_descriptor(req, &desc, None),
            Err(e) => respond_error(req, &e),
        },
        Method::Get => {
            let result = statter
                .stat(&digest)
                .and_then(|desc| Ok((registry.store().get(&scope.repo, &digest)?, desc)));
            match result {
                Ok((data, desc)) => respond_descriptor(req, &desc, Some(data)),
                Err(e) => respond_error(req, &e),
            }
        }
        Method::Delete => match statter.clear(&digest) {
            Ok(()) => {
                info!("DELETE {}/{digest}", scope.repo);
                respond(req, Response::empty(202));
            }
            Err(e) => respond_error(req, &e),
        },
        _ => respond_error(req, &ServerError::MethodNotAllowed),
    }
}

fn handle_upload(registry: &Registry, mut req: Request, name: &str, digest: Option<String>) {
    if *req.method() != Method::Post {
        return respond_error(req, &ServerError::MethodNotAllowed);
    }
    let scope = match registry.scope(name) {
        Ok(scope) => scope,
        Err(e) => return respond_error(req, &e),
    };
    let Some(digest) = digest else {
        return respond_error(req, &ServerError::MissingDigest);
    };
    let digest = Digest::new(digest);
    let body = match read_body(&mut req) {
        Ok(body) => body,
        Err(e) => return respond_error(req, &e),
    };

    match registry.store().put(&scope.repo, &digest, &body) {
        Ok(desc) => {
            info!("PUT {}/{digest}: {} bytes", scope.repo, body.len());
            let statter = CachedBlobStatter::new(
                scope.cache.as_ref().map(|c| c as &dyn BlobDescriptorService),
                registry.store(),
                &scope.repo,
            );
            statter.remember(&digest, &desc);
            let location = format!("/v2/{}/blobs/{digest}", scope.repo);
            let resp = with_headers(
                Response::empty(201),
                &[
                    ("Location", location.as_str()),
                    ("Docker-Content-Digest", digest.as_str()),
                ],
            );
            respond(req, resp);
        }
        Err(e) => respond_error(req, &e),
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(registry: &Registry, req: Request) {
    debug!("{} {}", req.method(), req.url());
    let url = match request_url(req.url()) {
        Ok(url) => url,
        Err(e) => return respond_error(req, &e),
    };

    match parse_route(url.path()) {
        Some(Route::Base) if *req.method() == Method::Get => {
            respond_json(req, 200, &serde_json::json!({}));
        }
        Some(Route::Health) if *req.method() == Method::Get => {
            respond_json(req, 200, &serde_json::json!({ "status": "ok" }));
        }
        Some(Route::Base | Route::Health) => respond_error(req, &ServerError::MethodNotAllowed),
        Some(Route::Blob { name, digest }) => handle_blob(registry, req, name, digest),
        Some(Route::Upload { name }) => {
            handle_upload(registry, req, name, query_value(&url, "digest"));
        }
        None => respond_error(req, &ServerError::NotFound(url.path().to_owned())),
    }
}
