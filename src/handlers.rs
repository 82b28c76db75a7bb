use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::NotepadError;
use crate::routes::{page_location, FormValues, Title};
use crate::{AppState, ListPageData, Page, SharedState};

// 302 Found
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn render<T: Serialize>(state: &AppState, name: &str, data: &T) -> Response {
    match state.templates.render(name, data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(template = name, "render failed: {}", e);
            NotepadError::from(e).into_response()
        }
    }
}

async fn persist(state: &AppState, page: Page) -> Response {
    match state.store.save(&page).await {
        Ok(()) => found(page_location("view", &page.title)),
        Err(e) => {
            tracing::error!(title = %page.title, "save failed: {}", e);
            e.into_response()
        }
    }
}

// GET /view/{title}
pub async fn view(State(state): State<SharedState>, Title(title): Title) -> Response {
    match state.store.load(&title).await {
        Ok(page) => render(&state, "view", &page),
        Err(e) if e.is_not_found() => found(page_location("edit", &title)),
        Err(e) => {
            tracing::error!(title = %title, "load failed: {}", e);
            e.into_response()
        }
    }
}

// GET /edit/{title}
pub async fn edit(State(state): State<SharedState>, Title(title): Title) -> Response {
    let loaded = state.store.load(&title).await;
    let page = match loaded {
        Ok(page) => page,
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!(title = %title, "load failed, editing blank page: {}", e);
            }
            Page {
                title,
                body: Vec::new(),
            }
        }
    };
    render(&state, "edit", &page)
}

// POST /save/{title}
pub async fn save(
    State(state): State<SharedState>,
    Title(title): Title,
    form: FormValues,
) -> Response {
    let page = Page {
        title,
        body: form.value("body").into_bytes(),
    };
    persist(&state, page).await
}

// GET /add
pub async fn add_form(State(state): State<SharedState>) -> Response {
    render(&state, "add", &json!({}))
}

// POST /add
pub async fn add(State(state): State<SharedState>, form: FormValues) -> Response {
    let page = Page {
        title: form.value("title"),
        body: form.value("body").into_bytes(),
    };
    persist(&state, page).await
}

// GET /
pub async fn list(State(state): State<SharedState>) -> Response {
    let titles = match state.store.list().await {
        Ok(titles) => titles,
        Err(e) => {
            // An unreadable notes dir stops the whole server
            tracing::error!("cannot read notes directory: {}", e);
            std::process::exit(1);
        }
    };

    let data = ListPageData {
        page_title: state.list_title.clone(),
        todos: titles
            .into_iter()
            .map(|title| Page {
                title,
                body: Vec::new(),
            })
            .collect(),
    };

    match state.templates.render("list", &data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(template = "list", "render failed: {}", e);
            Html(String::new()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{routes, PageStore, Templates};
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, Request},
        Router,
    };
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const VIEW: &str = "<h1>{{title}}</h1><div>{{body}}</div>";
    const EDIT: &str = "<h1>Editing {{title}}</h1>\
        <form action=\"/save/{{title}}\" method=\"POST\">\
        <textarea name=\"body\">{{body}}</textarea></form>";
    const LIST: &str = "<h1>{{page_title}}</h1><ul>{{#each todos}}<li>{{title}}</li>{{/each}}</ul>";
    const ADD: &str = "<form action=\"/add\" method=\"POST\"><input name=\"title\"></form>";

    fn app_with(notes: &Path, sources: [(&str, &str); 4]) -> Router {
        let state = AppState {
            store: PageStore::new(notes),
            templates: Templates::from_sources(sources).unwrap(),
            list_title: "My notes list".to_string(),
        };
        routes::router(Arc::new(state))
    }

    fn app(notes: &Path) -> Router {
        app_with(
            notes,
            [("view", VIEW), ("edit", EDIT), ("list", LIST), ("add", ADD)],
        )
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn location(headers: &HeaderMap) -> &str {
        headers.get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_save_then_view_shows_body() {
        let dir = TempDir::new().unwrap();
        let app = app(dir.path());

        let (status, headers, _) = send(&app, post_form("/save/Shopping", "body=milk+%26+eggs")).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/view/Shopping");

        let (status, _, html) = send(&app, get("/view/Shopping")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h1>Shopping</h1>"));
        assert!(html.contains("milk &amp; eggs"));
    }

    #[tokio::test]
    async fn test_view_missing_redirects_to_edit() {
        let dir = TempDir::new().unwrap();
        let (status, headers, _) = send(&app(dir.path()), get("/view/Missing")).await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/edit/Missing");
    }

    #[tokio::test]
    async fn test_edit_missing_renders_blank_form() {
        let dir = TempDir::new().unwrap();
        let (status, _, html) = send(&app(dir.path()), get("/edit/Fresh")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Editing Fresh"));
        assert!(html.contains("action=\"/save/Fresh\""));
        assert!(html.contains("<textarea name=\"body\"></textarea>"));
    }

    #[tokio::test]
    async fn test_edit_existing_prefills_body() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Draft.txt"), "first line").unwrap();

        let (status, _, html) = send(&app(dir.path()), get("/edit/Draft")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<textarea name=\"body\">first line</textarea>"));
    }

    #[tokio::test]
    async fn test_non_alphanumeric_title_is_404() {
        let dir = TempDir::new().unwrap();
        let app = app(dir.path());

        for request in [
            get("/view/foo!bar"),
            get("/edit/foo!bar"),
            post_form("/save/foo!bar", "body=x"),
            get("/view/a%2Fb"),
        ] {
            let (status, _, _) = send(&app, request).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        assert!(!dir.path().join("foo!bar.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_paths_are_404() {
        let dir = TempDir::new().unwrap();
        let app = app(dir.path());

        for uri in ["/nope", "/view/", "/view/a/b", "/list"] {
            let (status, _, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body, "404 page not found");
        }
    }

    #[tokio::test]
    async fn test_save_requires_post() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = send(&app(dir.path()), get("/save/abc")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_save_without_body_field_writes_empty_note() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = send(&app(dir.path()), post_form("/save/Empty", "")).await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(std::fs::read(dir.path().join("Empty.txt")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_save_failure_is_500_with_error_text() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("absent");
        let (status, _, body) = send(&app(&notes), post_form("/save/abc", "body=x")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("abc.txt"));
    }

    #[tokio::test]
    async fn test_list_enumerates_saved_titles() {
        let dir = TempDir::new().unwrap();
        let app = app(dir.path());

        for title in ["c", "a", "b"] {
            let (status, _, _) = send(&app, post_form(&format!("/save/{}", title), "body=x")).await;
            assert_eq!(status, StatusCode::FOUND);
        }

        let (status, _, html) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h1>My notes list</h1>"));
        assert!(html.contains("<ul><li>a</li><li>b</li><li>c</li></ul>"));
    }

    #[tokio::test]
    async fn test_list_render_failure_is_logged_not_surfaced() {
        let dir = TempDir::new().unwrap();
        let app = app_with(
            dir.path(),
            [("view", VIEW), ("edit", EDIT), ("list", "{{missing}}"), ("add", ADD)],
        );

        let (status, _, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_view_render_failure_is_500() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), "body").unwrap();
        let app = app_with(
            dir.path(),
            [("view", "{{nope}}"), ("edit", EDIT), ("list", LIST), ("add", ADD)],
        );

        let (status, _, body) = send(&app, get("/view/x")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("nope"));
    }

    #[tokio::test]
    async fn test_add_get_renders_form() {
        let dir = TempDir::new().unwrap();
        let (status, _, html) = send(&app(dir.path()), get("/add")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(html, ADD);
    }

    #[tokio::test]
    async fn test_add_post_creates_note_and_redirects() {
        let dir = TempDir::new().unwrap();
        let (status, headers, _) = send(
            &app(dir.path()),
            post_form("/add", "title=newnote&body=hello"),
        )
        .await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/view/newnote");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("newnote.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_add_does_not_enforce_title_pattern() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = send(
            &app(dir.path()),
            post_form("/add", "title=with-dash&body=ok"),
        )
        .await;

        assert_eq!(status, StatusCode::FOUND);
        assert!(dir.path().join("with-dash.txt").exists());
    }

    #[tokio::test]
    async fn test_add_failure_is_500() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("absent");
        let (status, _, _) = send(&app(&notes), post_form("/add", "title=a&body=b")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_add_title_with_control_character_redirects_encoded() {
        let dir = TempDir::new().unwrap();
        let (status, headers, _) =
            send(&app(dir.path()), post_form("/add", "title=a%0Ab&body=x")).await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/view/a%0Ab");
        assert!(dir.path().join("a\nb.txt").exists());
    }

    #[tokio::test]
    async fn test_unreadable_note_is_500_on_view_and_blank_on_edit() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("dir.txt")).unwrap();
        let app = app(dir.path());

        let (status, _, _) = send(&app, get("/view/dir")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _, html) = send(&app, get("/edit/dir")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Editing dir"));
        assert!(html.contains("<textarea name=\"body\"></textarea>"));
    }

    #[tokio::test]
    async fn test_save_accepts_body_without_form_content_type() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/save/plain")
            .body(Body::from("body=hello"))
            .unwrap();

        let (status, headers, _) = send(&app(dir.path()), request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/view/plain");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("plain.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_add_reads_fields_from_query_string() {
        let dir = TempDir::new().unwrap();
        let (status, headers, _) = send(
            &app(dir.path()),
            post_form("/add?title=fromquery&body=q", ""),
        )
        .await;

        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "/view/fromquery");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fromquery.txt")).unwrap(),
            "q"
        );
    }
}
