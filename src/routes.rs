use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tower_http::trace::TraceLayer;
use url::{form_urlencoded, Url};

use crate::{handlers, SharedState};

static VALID_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("title pattern is valid"));

static BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").expect("base url is valid"));

const NOT_FOUND_BODY: &str = "404 page not found";

pub fn is_valid_title(title: &str) -> bool {
    VALID_TITLE.is_match(title)
}

/// A note title taken from the `{title}` path segment.
///
/// Extraction fails with 404 unless the title is purely alphanumeric, which
/// keeps view/edit/save away from anything that is not a plain file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title(pub String);

impl<S> FromRequestParts<S> for Title
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(title) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| (StatusCode::NOT_FOUND, NOT_FOUND_BODY))?;

        if !is_valid_title(&title) {
            tracing::debug!(title = %title, "rejected title");
            return Err((StatusCode::NOT_FOUND, NOT_FOUND_BODY));
        }
        Ok(Title(title))
    }
}

/// Path of a page under `route`, e.g. `/view/<title>`, with the title
/// percent-encoded so it is always a valid `Location` header.
pub fn page_location(route: &str, title: &str) -> String {
    let mut url = BASE_URL.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(route).push(title);
    }
    url.path().to_string()
}

/// Form fields from the request body and query string.
///
/// The body is decoded as `application/x-www-form-urlencoded` whatever the
/// `Content-Type` says. A body field wins over a query field of the same name,
/// and the first occurrence of a repeated name wins. Missing fields read as "".
#[derive(Debug, Clone, Default)]
pub struct FormValues(HashMap<String, String>);

impl FormValues {
    pub fn value(&self, key: &str) -> String {
        self.0.get(key).cloned().unwrap_or_default()
    }

    fn absorb(&mut self, encoded: &[u8]) {
        for (key, value) in form_urlencoded::parse(encoded) {
            self.0
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
}

impl<S> FromRequest<S> for FormValues
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = req.uri().query().unwrap_or_default().to_string();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let mut values = FormValues::default();
        values.absorb(&body);
        values.absorb(query.as_bytes());
        Ok(values)
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handlers::list))
        .route("/view/{title}", get(handlers::view))
        .route("/edit/{title}", get(handlers::edit))
        .route("/save/{title}", post(handlers::save))
        .route("/add", get(handlers::add_form).post(handlers::add))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}
