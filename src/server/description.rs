use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use xmltree::{Element, XMLNode};

use crate::{DeviceIdentity, Result};

use super::{text_element, write_document};

pub const DEVICE_DESCRIPTION_PATH: &str = "/dd.xml";

const APPLICATION_URL: &str = "application-url";

#[derive(Clone)]
struct DescriptionState {
    document: Arc<str>,
    application_url: HeaderValue,
}

/// UPnP device description for `identity`.
pub fn render_device_description(identity: &DeviceIdentity) -> Result<String> {
    let mut spec_version = Element::new("specVersion");
    spec_version.children.push(XMLNode::Element(text_element("major", "1")));
    spec_version.children.push(XMLNode::Element(text_element("minor", "0")));

    let mut device = Element::new("device");
    for child in [
        text_element("deviceType", "urn:schemas-upnp-org:device:tvdevice:1"),
        text_element("friendlyName", identity.friendly_name.as_str()),
        text_element("manufacturer", " "),
        text_element("modelName", identity.model_name.as_str()),
        text_element("UDN", format!("uuid:{}", identity.uuid)),
    ] {
        device.children.push(XMLNode::Element(child));
    }

    let mut root = Element::new("root");
    root.attributes.insert(
        "xmlns".to_string(),
        "urn:schemas-upnp-org:device-1-0".to_string(),
    );
    root.attributes.insert(
        "xmlns:r".to_string(),
        "urn:restful-tv-org:schemas:upnp-dd".to_string(),
    );
    root.children.push(XMLNode::Element(spec_version));
    root.children.push(XMLNode::Element(device));

    write_document(&root)
}

/// Router serving `/dd.xml` and nothing else. `application_url` is the DIAL
/// base (`http://<ip>:<dialPort>/apps/`) handed out in `Application-URL`.
pub fn router(identity: &DeviceIdentity, application_url: &str) -> Result<Router> {
    let application_url = HeaderValue::from_str(application_url)
        .unwrap_or_else(|_| HeaderValue::from_static("/apps/"));

    let state = DescriptionState {
        document: render_device_description(identity)?.into(),
        application_url,
    };

    Ok(Router::new()
        .route(DEVICE_DESCRIPTION_PATH, any(device_description))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http()))
}

async fn device_description(method: Method, State(state): State<DescriptionState>) -> Response {
    if method != Method::GET {
        return not_found().await.into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/xml")),
            (HeaderName::from_static(APPLICATION_URL), state.application_url.clone()),
        ],
        state.document.to_string(),
    )
        .into_response()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("Kitchen <TV> & co").with_defaults()
    }

    #[tokio::test]
    async fn test_dd_xml_has_identity_and_application_url() {
        let app = router(&identity(), "http://10.0.0.5:8008/apps/").unwrap();
        let resp = app
            .oneshot(Request::get("/dd.xml").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/xml");
        assert_eq!(resp.headers()["application-url"], "http://10.0.0.5:8008/apps/");

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let root = Element::parse(&body[..]).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.namespace.as_deref(), Some("urn:schemas-upnp-org:device-1-0"));

        let device = root.get_child("device").unwrap();
        let text = |name: &str| device.get_child(name).unwrap().get_text().unwrap().into_owned();
        assert_eq!(text("friendlyName"), "Kitchen <TV> & co");
        assert_eq!(text("UDN"), "uuid:deadbeef-dead-beef-dead-beefdeadbeef");
        assert_eq!(text("deviceType"), "urn:schemas-upnp-org:device:tvdevice:1");
    }

    #[tokio::test]
    async fn test_other_paths_and_methods_are_404() {
        let app = router(&identity(), "http://10.0.0.5:8008/apps/").unwrap();

        let resp = app
            .clone()
            .oneshot(Request::get("/description.xml").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(Request::post("/dd.xml").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
