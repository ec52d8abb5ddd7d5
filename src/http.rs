//! HTTP API for the organization directory
//!
//! Every path accepts an optional `/api` prefix and a trailing slash. All
//! routes except `/health` require the `X-API-Key` header.
//!
//! ## Activities
//! - `GET /activities` - Flat page of activities
//! - `GET /activities/{id}` - Activity with parent and descendants
//! - `POST /activities` - Create (`{name, parent_id?}`)
//! - `PATCH /activities/{id}` - Rename and/or re-parent (`{name?, parent_id?}`)
//! - `DELETE /activities/{id}` - Delete; children become roots
//!
//! ## Buildings
//! - `GET /buildings`, `GET /buildings/{id}`
//! - `GET /buildings/in_radius?latitude&longitude&radius_km`
//! - `GET /buildings/in_rectangle?latitude&longitude&width&height`
//! - `POST /buildings`, `DELETE /buildings/{id}`
//!
//! ## Organizations
//! - `GET /organizations`, `GET /organizations/{id}`
//! - `GET /organizations/by_name?name=`
//! - `GET /organizations/by_building/{id}`
//! - `GET /organizations/by_activity/{id}` or `?name=`
//! - `GET /organizations/by_activity_branch/{id}` or `?name=`
//! - `GET /organizations/in_radius`, `GET /organizations/in_rectangle`
//! - `POST /organizations`, `DELETE /organizations/{id}`
//! - `POST /organizations/{id}/phones` - Add a phone (`{number}`)
//! - `PUT|DELETE /organizations/{id}/activities/{activity_id}` - Tag / untag
//!
//! ## Example Usage
//!
//! ```bash
//! curl -H "X-API-Key: $API_KEY" \
//!      "http://localhost:8000/api/organizations/by_activity_branch/?name=Food&limit=20"
//! ```

use crate::auth::ApiKeyValidator;
use crate::db::{CreateActivityInput, CreateBuildingInput, CreateOrganizationInput, UpdateActivityInput};
use crate::error::DirectoryError;
use crate::params::QueryParams;
use crate::services::{
    created, error_response, from_delete_bool_result, from_option, method_not_allowed, not_found,
    ok, ActivityRef, HandlerResult, Services,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::HeaderMap;
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Top-level resources; a known resource with an unsupported method is a 405
const RESOURCES: [&str; 3] = ["activities", "buildings", "organizations"];

/// Default request body cap
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    validator: ApiKeyValidator,
    bind_addr: SocketAddr,
    max_body_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct AddPhoneInput {
    number: String,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, validator: ApiKeyValidator, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            validator,
            bind_addr,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Cap request bodies at `limit` bytes
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), DirectoryError> {
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

    /// Collect the body and hand the request to [`HttpServer::dispatch`]
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = match collect_body(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                warn!(method = %parts.method, path = %parts.uri.path(), error = %e, "Rejected request body");
                return Ok(error_response(e));
            }
        };

        Ok(self.dispatch(parts.method, &parts.uri, &parts.headers, body).await)
    }

    /// Authenticate and route one request
    pub async fn dispatch(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        let segments = route_segments(uri.path());

        debug!(method = %method, path = %uri.path(), "Incoming request");

        if method == Method::GET && segments == ["health"] {
            return match self.handle_health().await {
                Ok(response) => response,
                Err(e) => error_response(e),
            };
        }

        if let Err(e) = self.validator.validate_headers(headers) {
            warn!(method = %method, path = %uri.path(), "Rejected request without valid API key");
            return error_response(e);
        }

        match self.route(method, &segments, uri.query(), body).await {
            Ok(response) => response,
            Err(e) => error_response(e),
        }
    }

    async fn route(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<&str>,
        body: Bytes,
    ) -> HandlerResult {
        let params = QueryParams::parse(query)?;

        match (method, segments) {
            // Activities
            (Method::GET, ["activities"]) => {
                let page = params.page()?;
                let rows = self.call(move |s| s.activities.list(page)).await?;
                Ok(ok(&rows))
            }
            (Method::POST, ["activities"]) => {
                let input: CreateActivityInput = parse_body(&body)?;
                let row = self.call(move |s| s.activities.create(input)).await?;
                Ok(created(&row))
            }
            (Method::GET, ["activities", id]) => {
                let id = parse_id(id)?;
                let tree = self.call(move |s| s.activities.tree(id)).await?;
                Ok(ok(&tree))
            }
            (Method::PATCH, ["activities", id]) => {
                let id = parse_id(id)?;
                let input: UpdateActivityInput = parse_body(&body)?;
                let row = self.call(move |s| s.activities.update(id, input)).await?;
                Ok(ok(&row))
            }
            (Method::DELETE, ["activities", id]) => {
                let id = parse_id(id)?;
                let result = self.call(move |s| s.activities.delete(id)).await;
                Ok(from_delete_bool_result(result, "Activity not found"))
            }

            // Buildings
            (Method::GET, ["buildings"]) => {
                let page = params.page()?;
                let rows = self.call(move |s| s.buildings.list(page)).await?;
                Ok(ok(&rows))
            }
            (Method::POST, ["buildings"]) => {
                let input: CreateBuildingInput = parse_body(&body)?;
                let row = self.call(move |s| s.buildings.create(input)).await?;
                Ok(created(&row))
            }
            (Method::GET, ["buildings", "in_radius"]) => {
                let radius = params.radius()?;
                let page = params.page()?;
                let rows = self.call(move |s| s.buildings.in_radius(&radius, page)).await?;
                Ok(ok(&rows))
            }
            (Method::GET, ["buildings", "in_rectangle"]) => {
                let bbox = params.rectangle()?;
                let page = params.page()?;
                let rows = self.call(move |s| s.buildings.in_rectangle(&bbox, page)).await?;
                Ok(ok(&rows))
            }
            (Method::GET, ["buildings", id]) => {
                let id = parse_id(id)?;
                let result = self.call(move |s| s.buildings.get(id)).await;
                Ok(from_option(result, "Building not found"))
            }
            (Method::DELETE, ["buildings", id]) => {
                let id = parse_id(id)?;
                let result = self.call(move |s| s.buildings.delete(id)).await;
                Ok(from_delete_bool_result(result, "Building not found"))
            }

            // Organizations
            (Method::GET, ["organizations"]) => {
                let page = params.page()?;
                let views = self.call(move |s| s.directory.list(page)).await?;
                Ok(ok(&views))
            }
            (Method::POST, ["organizations"]) => {
                let input: CreateOrganizationInput = parse_body(&body)?;
                let view = self.call(move |s| s.directory.create(input)).await?;
                Ok(created(&view))
            }
            (Method::GET, ["organizations", "by_name"]) => {
                let name = params.required_str("name")?.to_string();
                let view = self.call(move |s| s.directory.by_name(&name)).await?;
                Ok(ok(&view))
            }
            (Method::GET, ["organizations", "in_radius"]) => {
                let radius = params.radius()?;
                let page = params.page()?;
                let views = self.call(move |s| s.directory.in_radius(&radius, page)).await?;
                Ok(ok(&views))
            }
            (Method::GET, ["organizations", "in_rectangle"]) => {
                let bbox = params.rectangle()?;
                let page = params.page()?;
                let views = self.call(move |s| s.directory.in_rectangle(&bbox, page)).await?;
                Ok(ok(&views))
            }
            (Method::GET, ["organizations", "by_building"]) => Err(DirectoryError::Validation(
                "building id is required: /organizations/by_building/{id}".into(),
            )),
            (Method::GET, ["organizations", "by_building", id]) => {
                let id = parse_id(id)?;
                let page = params.page()?;
                let views = self.call(move |s| s.directory.by_building(id, page)).await?;
                Ok(ok(&views))
            }
            (Method::GET, ["organizations", "by_activity", rest @ ..]) if rest.len() <= 1 => {
                let activity = activity_ref(rest, &params)?;
                let page = params.page()?;
                let views = self
                    .call(move |s| s.directory.by_activity(&activity, page))
                    .await?;
                Ok(ok(&views))
            }
            (Method::GET, ["organizations", "by_activity_branch", rest @ ..]) if rest.len() <= 1 => {
                let activity = activity_ref(rest, &params)?;
                let page = params.page()?;
                let views = self
                    .call(move |s| s.directory.by_activity_branch(&activity, page))
                    .await?;
                Ok(ok(&views))
            }
            (Method::GET, ["organizations", id]) => {
                let id = parse_id(id)?;
                let result = self.call(move |s| s.directory.get(id)).await;
                Ok(from_option(result, "Organization not found"))
            }
            (Method::DELETE, ["organizations", id]) => {
                let id = parse_id(id)?;
                let result = self.call(move |s| s.directory.delete(id)).await;
                Ok(from_delete_bool_result(result, "Organization not found"))
            }
            (Method::POST, ["organizations", id, "phones"]) => {
                let id = parse_id(id)?;
                let input: AddPhoneInput = parse_body(&body)?;
                let phone = self
                    .call(move |s| s.directory.add_phone(id, &input.number))
                    .await?;
                Ok(created(&phone))
            }
            (Method::PUT, ["organizations", id, "activities", activity_id]) => {
                let id = parse_id(id)?;
                let activity_id = parse_id(activity_id)?;
                let view = self.call(move |s| s.directory.tag(id, activity_id)).await?;
                Ok(ok(&view))
            }
            (Method::DELETE, ["organizations", id, "activities", activity_id]) => {
                let id = parse_id(id)?;
                let activity_id = parse_id(activity_id)?;
                let view = self.call(move |s| s.directory.untag(id, activity_id)).await?;
                Ok(ok(&view))
            }

            (_, [resource, ..]) if segments.len() <= 2 && RESOURCES.contains(resource) => {
                Ok(method_not_allowed())
            }

            // Not found
            _ => Ok(not_found("Not Found")),
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> HandlerResult {
        let stats = self.call(|s| s.db.stats()).await?;
        Ok(ok(&serde_json::json!({
            "status": "ok",
            "activities": stats.activity_count,
            "buildings": stats.building_count,
            "organizations": stats.organization_count,
            "phones": stats.phone_count,
        })))
    }

    /// Run a service call on the blocking pool
    ///
    /// The call runs against a store handle tied to this future: if the
    /// future is dropped (client disconnect), queued work is refused and an
    /// in-flight write rolls back instead of committing.
    async fn call<F, T>(&self, f: F) -> Result<T, DirectoryError>
    where
        F: FnOnce(&Services) -> Result<T, DirectoryError> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let services = Services::new(Arc::new(self.services.db.scoped(cancel)));

        tokio::task::spawn_blocking(move || f(&services))
            .await
            .map_err(|e| DirectoryError::Internal(format!("Blocking task failed: {}", e)))?
    }
}

/// Collect a request body, refusing anything over `limit` bytes
async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes, DirectoryError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(DirectoryError::PayloadTooLarge { limit }),
        Err(e) => Err(DirectoryError::Internal(format!("Failed to read request body: {}", e))),
    }
}

/// Path segments with the optional `/api` prefix and empty segments removed
fn route_segments(path: &str) -> Vec<&str> {
    let path = match path.strip_prefix("/api") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Positive integer id from a path segment
fn parse_id(raw: &str) -> Result<i64, DirectoryError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(DirectoryError::Validation(format!(
            "path id must be a positive integer, got {:?}",
            raw
        ))),
    }
}

/// `/{id}` suffix or `?name=`
fn activity_ref(rest: &[&str], params: &QueryParams) -> Result<ActivityRef, DirectoryError> {
    match rest {
        [id] => Ok(ActivityRef::Id(parse_id(id)?)),
        _ => Ok(ActivityRef::Name(params.required_str("name")?.to_string())),
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, DirectoryError> {
    serde_json::from_slice(body)
        .map_err(|e| DirectoryError::Validation(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DirectoryDb;
    use hyper::header::{HeaderValue, WWW_AUTHENTICATE};
    use hyper::StatusCode;
    use serde_json::{json, Value};
    use std::time::Duration;

    const KEY: &str = "test-key";

    fn server() -> HttpServer {
        let db = Arc::new(DirectoryDb::open_in_memory().unwrap());
        HttpServer::new(
            Arc::new(Services::new(db)),
            ApiKeyValidator::new(KEY),
            "127.0.0.1:0".parse().unwrap(),
        )
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static(KEY));
        headers
    }

    async fn send(server: &HttpServer, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let uri: Uri = uri.parse().unwrap();
        let body = body.map(|v| Bytes::from(v.to_string())).unwrap_or_default();
        let response = server.dispatch(method, &uri, &auth_headers(), body).await;

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let server = server();
        let uri: Uri = "/health".parse().unwrap();
        let response = server
            .dispatch(Method::GET, &uri, &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let server = server();
        let uri: Uri = "/api/activities".parse().unwrap();
        let response = server
            .dispatch(Method::GET, &uri, &HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "X-API-Key");
    }

    #[tokio::test]
    async fn test_prefix_and_trailing_slash() {
        let server = server();
        for uri in ["/activities", "/activities/", "/api/activities", "/api/activities/"] {
            let (status, body) = send(&server, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body, json!([]));
        }
    }

    #[tokio::test]
    async fn test_pagination_bounds() {
        let server = server();
        for uri in [
            "/api/organizations/?limit=0",
            "/api/organizations/?limit=101",
            "/api/organizations/?offset=-1",
        ] {
            let (status, _) = send(&server, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_activity_hierarchy_over_http() {
        let server = server();

        let (status, food) = send(&server, Method::POST, "/api/activities/", Some(json!({"name": "Food"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let food_id = food["id"].as_i64().unwrap();

        let (_, meat) = send(
            &server,
            Method::POST,
            "/api/activities",
            Some(json!({"name": "Meat", "parent_id": food_id})),
        )
        .await;
        let meat_id = meat["id"].as_i64().unwrap();

        let (_, sausages) = send(
            &server,
            Method::POST,
            "/api/activities",
            Some(json!({"name": "Sausages", "parent_id": meat_id})),
        )
        .await;
        let sausages_id = sausages["id"].as_i64().unwrap();

        let (status, body) = send(
            &server,
            Method::POST,
            "/api/activities",
            Some(json!({"name": "Smoked", "parent_id": sausages_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("levels"));

        let (status, _) = send(
            &server,
            Method::PATCH,
            &format!("/api/activities/{}", food_id),
            Some(json!({"parent_id": sausages_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &server,
            Method::PATCH,
            &format!("/api/activities/{}", food_id),
            Some(json!({"parent_id": food_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, tree) = send(&server, Method::GET, &format!("/api/activities/{}/", meat_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree["parent"]["id"], food_id);
        assert_eq!(tree["children"][0]["name"], "Sausages");
    }

    #[tokio::test]
    async fn test_organization_routes() {
        let server = server();

        let (_, building) = send(
            &server,
            Method::POST,
            "/api/buildings",
            Some(json!({"address": "Lenina 1", "latitude": 0.0, "longitude": 0.0})),
        )
        .await;
        let building_id = building["id"].as_i64().unwrap();

        let (_, food) = send(&server, Method::POST, "/api/activities", Some(json!({"name": "Food"}))).await;
        let food_id = food["id"].as_i64().unwrap();

        let (status, org) = send(
            &server,
            Method::POST,
            "/api/organizations",
            Some(json!({
                "name": "Horns and Hooves",
                "building_id": building_id,
                "phones": ["2-222-222"],
                "activity_ids": [food_id]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let org_id = org["id"].as_i64().unwrap();
        assert_eq!(org["building"]["address"], "Lenina 1");

        let (status, found) = send(&server, Method::GET, "/api/organizations/by_name?name=horns%20and%20hooves", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], org_id);

        let (_, branch) = send(&server, Method::GET, "/api/organizations/by_activity_branch/?name=food", None).await;
        assert_eq!(branch.as_array().unwrap().len(), 1);

        let (_, near) = send(
            &server,
            Method::GET,
            "/api/organizations/in_radius?latitude=0&longitude=0&radius_km=1",
            None,
        )
        .await;
        assert_eq!(near.as_array().unwrap().len(), 1);

        let (status, phone) = send(
            &server,
            Method::POST,
            &format!("/api/organizations/{}/phones", org_id),
            Some(json!({"number": "3-333-333"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(phone["number"], "3-333-333");

        let (status, view) = send(
            &server,
            Method::DELETE,
            &format!("/api/organizations/{}/activities/{}", org_id, food_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["activities"], json!([]));
        assert_eq!(view["phones"].as_array().unwrap().len(), 2);

        let (status, _) = send(&server, Method::DELETE, &format!("/api/buildings/{}", building_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&server, Method::DELETE, &format!("/api/organizations/{}", org_id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_not_found_and_bad_ids() {
        let server = server();

        let (status, _) = send(&server, Method::GET, "/api/organizations/by_building/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&server, Method::GET, "/api/activities/abc", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&server, Method::GET, "/api/buildings/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&server, Method::GET, "/api/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&server, Method::PUT, "/api/activities", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(&server, Method::POST, "/api/activities", Some(json!({"parent_id": 1}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_by_building_without_id_is_unprocessable() {
        let server = server();
        for uri in ["/api/organizations/by_building", "/api/organizations/by_building/"] {
            let (status, body) = send(&server, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
            assert!(body["error"].as_str().unwrap().contains("building id is required"));
        }
    }

    #[tokio::test]
    async fn test_body_over_limit_is_refused() {
        let body = Full::new(Bytes::from(vec![b'x'; 17]));
        let err = collect_body(body, 16).await.unwrap_err();
        assert!(matches!(err, DirectoryError::PayloadTooLarge { limit: 16 }));
        assert_eq!(error_response(err).status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = Full::new(Bytes::from_static(b"{\"name\":\"Food\"}"));
        let bytes = collect_body(body, DEFAULT_MAX_BODY_BYTES).await.unwrap();
        assert_eq!(&bytes[..], b"{\"name\":\"Food\"}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_request_does_not_commit() {
        let db = Arc::new(DirectoryDb::open_in_memory().unwrap());
        let server = HttpServer::new(
            Arc::new(Services::new(db.clone())),
            ApiKeyValidator::new(KEY),
            "127.0.0.1:0".parse().unwrap(),
        );

        // Hold the only connection so the request queues behind it
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let blocker_db = db.clone();
        let blocker = std::thread::spawn(move || {
            blocker_db
                .with_write(|_| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let uri: Uri = "/api/activities".parse().unwrap();
        let body = Bytes::from(json!({"name": "Ghost"}).to_string());
        let headers = auth_headers();
        let request = server.dispatch(Method::POST, &uri, &headers, body);
        assert!(tokio::time::timeout(Duration::from_millis(50), request).await.is_err());

        tokio::task::spawn_blocking(move || blocker.join().unwrap()).await.unwrap();
        // Give the abandoned blocking call time to reach its commit point
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(db.stats().unwrap().activity_count, 0);

        let (status, _) = send(&server, Method::POST, "/api/activities", Some(json!({"name": "Food"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(db.stats().unwrap().activity_count, 1);
    }

    #[test]
    fn test_route_segments() {
        assert_eq!(route_segments("/api/organizations/"), vec!["organizations"]);
        assert_eq!(route_segments("/organizations/5"), vec!["organizations", "5"]);
        assert_eq!(route_segments("/apiary"), vec!["apiary"]);
        assert!(route_segments("/api").is_empty());
    }
}
