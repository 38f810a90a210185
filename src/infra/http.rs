//! REST implementation of the network gateway.
//!
//! Maps every query key and mutation kind onto a route under the configured base URL, attaches
//! the session token, and folds HTTP failures into `GatewayError`.

use std::time::Duration;

use async_trait::async_trait;
use coherence_api_types::{BanRecord, ErrorBody, UserList, codes};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::{Namespace, QueryKey};
use crate::config::GatewaySettings;
use crate::domain::mutation::MutationKind;

use super::error::InfraError;
use super::gateway::{Gateway, GatewayError, Operation};
use super::session::SessionStore;

/// How a successful response body is turned into the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseShape {
    Raw,
    /// A `UserList` reduced to its `BanRecord` view.
    Bans,
}

#[derive(Debug, Clone, PartialEq)]
struct Route {
    method: Method,
    segments: Vec<String>,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    shape: ResponseShape,
}

impl Route {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| (*s).to_string()).collect(),
            query: Vec::new(),
            body: None,
            shape: ResponseShape::Raw,
        }
    }

    fn segment(mut self, value: impl Into<String>) -> Self {
        self.segments.push(value.into());
        self
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }
}

#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base: Url,
    token: String,
}

impl HttpGateway {
    pub fn new(site: &Url, token: String, timeout: Duration) -> Result<Self, InfraError> {
        let base = site
            .join("/")
            .map_err(|err| InfraError::configuration(format!("invalid base URL: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::configuration(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// Build from resolved settings, resolving the session token on the way.
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, InfraError> {
        let site = settings.base_url.as_ref().ok_or_else(|| {
            InfraError::configuration(
                "site URL is required (use --site, COHERENCE_SITE_URL or gateway.base_url)",
            )
        })?;
        let token = SessionStore::from_settings(settings).token()?;
        Self::new(site, token, settings.timeout)
    }

    pub fn user_agent() -> &'static str {
        concat!("coherence/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn auth_header(&self) -> Result<HeaderValue, GatewayError> {
        HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|err| GatewayError::InvalidRequest(format!("invalid session token: {err}")))
    }

    fn url(&self, route: &Route) -> Result<Url, GatewayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidRequest("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(&route.segments);
        if !route.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &route.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn handle(response: Response, shape: ResponseShape) -> Result<Value, GatewayError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::transport(err.to_string()))?;

        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_else(|_| {
                ErrorBody::new(
                    fallback_code(status),
                    fallback_message(status, &String::from_utf8_lossy(&bytes)),
                )
            });
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(GatewayError::Unauthorized {
                    status: status.as_u16(),
                    message: body.error.message,
                });
            }
            return Err(GatewayError::rejected(status.as_u16(), body));
        }

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|err| GatewayError::Decode(format!("failed to parse body: {err}")))?
        };

        match shape {
            ResponseShape::Raw => Ok(value),
            ResponseShape::Bans => {
                let list: UserList = serde_json::from_value(value)
                    .map_err(|err| GatewayError::Decode(format!("invalid user list: {err}")))?;
                serde_json::to_value(BanRecord::derive_from(&list.users))
                    .map_err(|err| GatewayError::Decode(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self, params), fields(operation = %operation))]
    async fn request(&self, operation: &Operation, params: Value) -> Result<Value, GatewayError> {
        let route = route_for(operation, params)?;
        let url = self.url(&route)?;
        debug!(method = %route.method, url = %url, "Sending gateway request");

        let mut request = self
            .client
            .request(route.method.clone(), url)
            .header(AUTHORIZATION, self.auth_header()?);
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::transport(err.to_string()))?;
        Self::handle(response, route.shape).await
    }
}

fn route_for(operation: &Operation, params: Value) -> Result<Route, GatewayError> {
    let route = match operation {
        Operation::Query(key) => query_route(key),
        Operation::Mutation(kind) => match kind {
            MutationKind::BanUser => admin_user(&params)?.segment("ban").body(params),
            MutationKind::UnbanUser => admin_user(&params)?.segment("unban").body(params),
            MutationKind::UpdateUserRole => admin_user(&params)?.segment("role").body(params),
            MutationKind::DeleteUserMessages => {
                let user_id = required(&params, "userId")?;
                Route::new(Method::DELETE, &["api", "admin", "users"])
                    .segment(user_id)
                    .segment("messages")
            }
            MutationKind::MarkNotificationRead => {
                let id = required(&params, "notificationId")?;
                Route::new(Method::PATCH, &["api", "notifications"])
                    .segment(id)
                    .segment("read")
            }
            MutationKind::MarkAllRead => {
                Route::new(Method::POST, &["api", "notifications", "read-all"])
            }
            MutationKind::DeleteNotification => {
                let id = required(&params, "notificationId")?;
                Route::new(Method::DELETE, &["api", "notifications"]).segment(id)
            }
            MutationKind::DeleteAllNotifications => {
                Route::new(Method::DELETE, &["api", "notifications"])
            }
            MutationKind::UpdateNotificationPreferences => {
                Route::new(Method::PUT, &["api", "notifications", "preferences"]).body(params)
            }
        },
    };
    Ok(route)
}

fn query_route(key: &QueryKey) -> Route {
    match key.namespace() {
        Namespace::Users => {
            let mut route = Route::new(Method::GET, &["api", "admin", "users"]);
            if let Some(search) = key.param(0).filter(|s| !s.is_empty()) {
                route = route.query("search", search);
            }
            if let Some(limit) = key.param(1) {
                route = route.query("limit", limit);
            }
            route
        }
        Namespace::Bans => Route::new(Method::GET, &["api", "admin", "users"])
            .query("banned", "true")
            .shape(ResponseShape::Bans),
        Namespace::Notifications => Route::new(Method::GET, &["api", "notifications"]),
        Namespace::NotificationUnreadCount => {
            Route::new(Method::GET, &["api", "notifications", "unread-count"])
        }
        Namespace::NotificationCounts => {
            Route::new(Method::GET, &["api", "notifications", "counts"])
        }
        Namespace::NotificationPreferences => {
            Route::new(Method::GET, &["api", "notifications", "preferences"])
        }
    }
}

fn admin_user(params: &Value) -> Result<Route, GatewayError> {
    let user_id = required(params, "userId")?;
    Ok(Route::new(Method::POST, &["api", "admin", "users"]).segment(user_id))
}

fn required(params: &Value, field: &str) -> Result<String, GatewayError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("missing `{field}` parameter")))
}

fn fallback_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => codes::VALIDATION,
        StatusCode::UNAUTHORIZED => codes::UNAUTHORIZED,
        StatusCode::FORBIDDEN => codes::FORBIDDEN,
        StatusCode::NOT_FOUND => codes::NOT_FOUND,
        _ => codes::INTERNAL,
    }
}

fn fallback_message(status: StatusCode, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        format!("status {status}")
    } else {
        format!("status {status} body {text}")
    }
}
