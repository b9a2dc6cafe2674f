//! DIAL REST endpoints under `/apps/`.
//!
//! | Request                              | Effect                          |
//! |--------------------------------------|---------------------------------|
//! | `GET /apps/<app>`                    | service XML for the last launch |
//! | `POST /apps/<app>`                   | launch, `201` + `Location`      |
//! | `GET /apps/<app>/<session>`          | service XML for that session    |
//! | `DELETE /apps/<app>/<session>`       | stop                            |
//! | `GET`/`POST /apps/<app>/<session>/hide` | hide                         |
//! | `POST /apps/<app>/dial_data`         | store additional data           |

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use url::form_urlencoded;
use xmltree::{Element, XMLNode};

use crate::apps::{AppRegistration, DialAppRegistry, DialDataStore};
use crate::{AppStatus, DialError, DialStatus, Result, SessionId};

use super::{is_xml_name, text_element, write_document};

/// Largest launch payload accepted, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 4096;

const DIAL_DATA_SEGMENT: &str = "dial_data";
const DIAL_XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

#[derive(Clone)]
pub struct DialState {
    registry: Arc<DialAppRegistry>,
    data: Arc<dyn DialDataStore>,
    host: IpAddr,
    port: u16,
}

impl DialState {
    /// `host`/`port` are the address senders reach this server on; they end
    /// up in `Location` headers.
    pub fn new(
        registry: Arc<DialAppRegistry>,
        data: Arc<dyn DialDataStore>,
        host: IpAddr,
        port: u16,
    ) -> Self {
        Self {
            registry,
            data,
            host,
            port,
        }
    }

    fn additional_data_fragment(&self, app: &str) -> String {
        let target = format!("http://localhost:{}/apps/{}/{}", self.port, app, DIAL_DATA_SEGMENT);
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("additionalDataUrl={}", encoded)
    }

    fn service_document(
        &self,
        registration: &AppRegistration,
        status: AppStatus,
        session: Option<SessionId>,
    ) -> DialResult {
        let state = status.status();
        let allow_stop = registration.app.can_stop() && status.can_stop;
        let run = session.filter(|_| state == DialStatus::Running);
        let data = registration
            .use_additional_data
            .then(|| self.data.retrieve(&registration.name));

        let body = render_service(&registration.name, state, allow_stop, run, data.as_deref())?;
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static(DIAL_XML_CONTENT_TYPE))],
            body,
        )
            .into_response())
    }
}

/// DIAL 2.1 `<service>` document. Stored pairs whose key is not a valid
/// element name are left out.
pub fn render_service(
    name: &str,
    state: DialStatus,
    allow_stop: bool,
    run: Option<SessionId>,
    additional_data: Option<&[(String, String)]>,
) -> Result<String> {
    let mut service = Element::new("service");
    service.attributes.insert(
        "xmlns".to_string(),
        "urn:dial-multiscreen-org:schemas:dial".to_string(),
    );
    service
        .attributes
        .insert("dialVer".to_string(), "2.1".to_string());
    service.children.push(XMLNode::Element(text_element("name", name)));

    let mut options = Element::new("options");
    options
        .attributes
        .insert("allowStop".to_string(), allow_stop.to_string());
    service.children.push(XMLNode::Element(options));
    service
        .children
        .push(XMLNode::Element(text_element("state", state.as_str())));

    if let Some(session) = run {
        let mut link = Element::new("link");
        link.attributes.insert("rel".to_string(), "run".to_string());
        link.attributes.insert("href".to_string(), session.to_string());
        service.children.push(XMLNode::Element(link));
    }

    if let Some(data) = additional_data {
        let mut additional = Element::new("additionalData");
        for (key, value) in data {
            if is_xml_name(key) {
                additional
                    .children
                    .push(XMLNode::Element(text_element(key, value.as_str())));
            } else {
                warn!("Skipping DIAL data key {:?} for {}", key, name);
            }
        }
        service.children.push(XMLNode::Element(additional));
    }

    write_document(&service)
}

pub fn router(state: DialState) -> Router {
    Router::new()
        .route("/apps/:app", get(app_info).post(launch))
        .route("/apps/:app/:session", get(session_info).post(post_to_session).delete(stop))
        .route("/apps/:app/:session/hide", get(hide).post(hide))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// A request the DIAL server turns down, answered with a bare status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection(pub StatusCode);

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.0, self.0.canonical_reason().unwrap_or_default()).into_response()
    }
}

impl From<DialError> for Rejection {
    fn from(err: DialError) -> Self {
        match err {
            DialError::UnknownApp(_) => Rejection(StatusCode::NOT_FOUND),
            other => {
                warn!("DIAL request failed: {}", other);
                Rejection(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

type DialResult = std::result::Result<Response, Rejection>;

fn check_origin(
    registration: &AppRegistration,
    headers: &HeaderMap,
) -> std::result::Result<(), Rejection> {
    let origin = match headers.get(header::ORIGIN) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| Rejection(StatusCode::FORBIDDEN))?),
    };

    if registration.origins.allows(origin) {
        Ok(())
    } else {
        debug!("Rejected origin {:?} for {}", origin, registration.name);
        Err(Rejection(StatusCode::FORBIDDEN))
    }
}

fn parse_session(raw: &str) -> std::result::Result<SessionId, Rejection> {
    raw.parse().map_err(|_| Rejection(StatusCode::NOT_FOUND))
}

async fn app_info(
    State(state): State<DialState>,
    Path(app): Path<String>,
    headers: HeaderMap,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;

    let session = state.registry.last_session(&app);
    let status = match session {
        Some(session) => state.registry.status(&app, session)?,
        None => AppStatus::stopped(),
    };
    state.service_document(registration, status, session)
}

async fn launch(
    State(state): State<DialState>,
    Path(app): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;

    if body.len() > MAX_PAYLOAD_LEN {
        return Err(Rejection(StatusCode::PAYLOAD_TOO_LARGE));
    }

    let payload = std::str::from_utf8(&body).map_err(|_| Rejection(StatusCode::BAD_REQUEST))?;
    let additional = registration
        .use_additional_data
        .then(|| state.additional_data_fragment(&app));

    let (_, session) = state.registry.start(
        &app,
        payload,
        query.as_deref().unwrap_or(""),
        additional.as_deref(),
    )?;

    let location = format!("http://{}:{}/apps/{}/{}", state.host, state.port, app, session);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
}

async fn session_info(
    State(state): State<DialState>,
    Path((app, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;
    let session = parse_session(&session)?;

    let status = state.registry.status(&app, session)?;
    state.service_document(registration, status, Some(session))
}

async fn post_to_session(
    State(state): State<DialState>,
    Path((app, segment)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;

    if segment != DIAL_DATA_SEGMENT {
        return Err(Rejection(StatusCode::METHOD_NOT_ALLOWED));
    }

    let data: Vec<(String, String)> = form_urlencoded::parse(&body).into_owned().collect();
    if let Some((key, _)) = data.iter().find(|(key, _)| !is_xml_name(key)) {
        debug!("Rejected DIAL data key {:?} for {}", key, app);
        return Err(Rejection(StatusCode::BAD_REQUEST));
    }
    debug!("Storing {} DIAL data pairs for {}", data.len(), app);
    state.data.store(&app, &data)?;
    Ok(StatusCode::OK.into_response())
}

async fn stop(
    State(state): State<DialState>,
    Path((app, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;
    let session = parse_session(&session)?;

    if !registration.app.can_stop() {
        return Err(Rejection(StatusCode::METHOD_NOT_ALLOWED));
    }

    state.registry.stop(&app, session)?;
    Ok(StatusCode::OK.into_response())
}

async fn hide(
    State(state): State<DialState>,
    Path((app, session)): Path<(String, String)>,
    headers: HeaderMap,
) -> DialResult {
    let registration = state.registry.lookup(&app)?;
    check_origin(registration, &headers)?;
    let session = parse_session(&session)?;

    if !registration.app.can_hide() {
        return Err(Rejection(StatusCode::NOT_IMPLEMENTED));
    }

    let status = state.registry.hide(&app, session)?;
    state.service_document(registration, status, Some(session))
}

async fn not_found() -> Rejection {
    Rejection(StatusCode::NOT_FOUND)
}
