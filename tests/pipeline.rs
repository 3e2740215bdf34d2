//! End-to-end behaviour of `App::handle` with in-memory requests.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use http::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use serde_json::{Value, json};
use switchyard::{
    ActionResult, App, Context, Controller, CorsOrigin, Error, ReplyStatus, Router, Signal,
};

// ── Fixture ───────────────────────────────────────────────────────────────────

async fn list(ctx: Context) -> Result<ActionResult, Error> {
    let view = json!([{ "id": "1" }, { "id": "2" }]);
    Ok(ActionResult::ok(ctx.with_view(view)))
}

async fn read(ctx: Context) -> Result<ActionResult, Error> {
    match ctx.params().and_then(|p| p.str("id")) {
        Some(id @ ("1" | "2")) => {
            let view = json!({ "id": id });
            Ok(ActionResult::ok(ctx.with_view(view)))
        }
        Some("gone") => Ok(ActionResult::signal(Signal::Unavailable, ctx)),
        Some("boom") => Err(Error::action("storage offline")),
        _ => Ok(ActionResult::signal(Signal::NotFound, ctx)),
    }
}

async fn create(ctx: Context) -> Result<ActionResult, Error> {
    let body = ctx.request_body().cloned().unwrap_or(Value::Null);
    Ok(ActionResult::reply(StatusCode::CREATED, ctx.with_view(body)))
}

async fn update(ctx: Context) -> Result<ActionResult, Error> {
    Ok(ActionResult::redirect(StatusCode::SEE_OTHER, "/users/1", ctx))
}

fn app() -> App {
    let users = Controller::rest()
        .on("list", list)
        .on("read", read)
        .on("create", create)
        .on("update", update);
    let articles = Controller::rest().on("list", list).on("read", read);

    let router = Router::new()
        .rest("/users/:id?", users)
        .rest("/articles/:id?", articles);

    App::new(router)
        .cors([CorsOrigin::new("https://app.example").methods([Method::GET, Method::POST])])
        .body_timeout(Duration::from_millis(100))
}

fn request(method: Method, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

fn empty(builder: http::request::Builder) -> Context {
    Context::from_request(builder.body(Full::<Bytes>::default()).unwrap())
}

fn json_body(builder: http::request::Builder, body: &'static str) -> Context {
    let request = builder
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, body.len())
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap();
    Context::from_request(request)
}

async fn send(ctx: Context) -> (http::Response<Full<Bytes>>, Context) {
    let ctx = app().handle(ctx).await;
    assert!(ctx.reply().is_ended());
    (ctx.clone().into_reply().into_response(), ctx)
}

async fn text(response: http::Response<Full<Bytes>>) -> String {
    let length: usize = response.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), length, "content-length must match the body");
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ── REST ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_and_read() {
    let (res, _) = send(empty(request(Method::GET, "/users"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(text(res).await, r#"[{"id":"1"},{"id":"2"}]"#);

    let (res, ctx) = send(empty(request(Method::GET, "/users/2"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(ctx.action(), Some("read"));
    assert_eq!(ctx.attributes().endpoint.as_deref(), Some("/users/:id?"));
    assert_eq!(text(res).await, r#"{"id":"2"}"#);
}

#[tokio::test]
async fn create_echoes_decoded_body() {
    let ctx = json_body(request(Method::POST, "/users"), r#"{"name":"ada"}"#);
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(text(res).await, r#"{"name":"ada"}"#);
}

#[tokio::test]
async fn update_redirects() {
    let ctx = json_body(request(Method::PUT, "/users/1"), "{}");
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[LOCATION], "/users/1");
    assert_eq!(text(res).await, "{}");
}

#[tokio::test]
async fn head_reads_like_get() {
    let (res, ctx) = send(empty(request(Method::HEAD, "/users/1"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(ctx.action(), Some("read"));
    assert_eq!(text(res).await, r#"{"id":"1"}"#);
}

#[tokio::test]
async fn unimplemented_update_lists_allowed_methods() {
    let ctx = json_body(request(Method::PUT, "/articles/1"), "{}");
    let (res, ctx) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "GET, HEAD");
    assert_eq!(ctx.status(), Some(ReplyStatus::ActionUnavailable));
    assert_eq!(text(res).await, r#"{"status":"Method Not Allowed"}"#);
}

#[tokio::test]
async fn method_without_table_row_is_bad_request() {
    let (res, ctx) = send(empty(request(Method::DELETE, "/users"))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.status(), Some(ReplyStatus::RequestUnsupported));
}

#[tokio::test]
async fn continuation_signals_map_to_statuses() {
    let (res, ctx) = send(empty(request(Method::GET, "/users/9"))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.status(), Some(ReplyStatus::ResourceMissing));
    assert_eq!(text(res).await, r#"{"status":"Not Found"}"#);

    let (res, _) = send(empty(request(Method::GET, "/users/gone"))).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ── Negotiation and bodies ────────────────────────────────────────────────────

#[tokio::test]
async fn unacceptable_representation_is_406() {
    let ctx = empty(request(Method::GET, "/users").header("accept", "text/html, image/*"));
    let (res, ctx) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(ctx.status(), Some(ReplyStatus::ResourceMismatch));
    assert_eq!(text(res).await, r#"{"status":"Not Acceptable"}"#);

    let ctx = empty(request(Method::GET, "/users").header("accept", "text/html, application/json;q=0"));
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::OK);

    let ctx = empty(request(Method::GET, "/users").header("accept", "text/html, */*;q=0.1"));
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn opaque_accept_is_406() {
    let accept = HeaderValue::from_bytes(b"text/html; x=\xe9").unwrap();
    let (res, ctx) = send(empty(request(Method::GET, "/users").header("accept", accept))).await;
    assert_eq!(res.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(ctx.status(), Some(ReplyStatus::ResourceMismatch));
}

#[tokio::test]
async fn opaque_content_type_is_rejected() {
    let request = request(Method::POST, "/users")
        .header(CONTENT_TYPE, HeaderValue::from_bytes(b"text/csv; x=\xe9").unwrap())
        .header(CONTENT_LENGTH, 7)
        .body(Full::new(Bytes::from_static(br#"{"a":1}"#)))
        .unwrap();
    let (res, ctx) = send(Context::from_request(request)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.status(), Some(ReplyStatus::RequestMalformed));
}

#[tokio::test]
async fn missing_content_type_still_decodes_json() {
    let request = request(Method::POST, "/users")
        .header(CONTENT_LENGTH, 7)
        .body(Full::new(Bytes::from_static(br#"{"a":1}"#)))
        .unwrap();
    let (res, _) = send(Context::from_request(request)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(text(res).await, r#"{"a":1}"#);
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    let ctx = json_body(request(Method::POST, "/users"), r#"{"name":"#);
    let (res, ctx) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.status(), Some(ReplyStatus::RequestMalformed));

    let ctx = json_body(request(Method::POST, "/users"), r#""just a string""#);
    let (_, ctx) = send(ctx).await;
    assert_eq!(ctx.status(), Some(ReplyStatus::RequestMalformed));
}

#[tokio::test]
async fn short_body_is_malformed() {
    let request = request(Method::POST, "/users")
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, 40)
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();
    let (res, _) = send(Context::from_request(request)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stalled_body_times_out() {
    let stalled = stream::once(async { Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"{"))) })
        .chain(stream::pending());
    let request = request(Method::POST, "/users")
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, 10)
        .body(StreamBody::new(stalled))
        .unwrap();

    let app = app();
    let ctx = Context::incoming(request, None, app.timeout());
    let ctx = app.handle(ctx).await;
    assert_eq!(ctx.reply().status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(ctx.status(), Some(ReplyStatus::Timeout));
}

#[tokio::test]
async fn unsupported_media_type_on_create() {
    let request = request(Method::POST, "/users")
        .header(CONTENT_TYPE, "application/xml")
        .header(CONTENT_LENGTH, 4)
        .body(Full::new(Bytes::from_static(b"<a/>")))
        .unwrap();
    let (res, ctx) = send(Context::from_request(request)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.status(), Some(ReplyStatus::MimeUnsupported));
}

// ── Routing, faults and CORS ──────────────────────────────────────────────────

#[tokio::test]
async fn unknown_path_is_404_with_error_text() {
    let (res, ctx) = send(empty(request(Method::PATCH, "/orders/7"))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.error(), Some("no route PATCH /orders/7"));
    assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(text(res).await, "404 - Not Found");
}

#[tokio::test]
async fn failing_action_is_500() {
    let (res, ctx) = send(empty(request(Method::GET, "/users/boom"))).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(ctx.error().is_some_and(|e| e.contains("storage offline")));
    assert_eq!(text(res).await, "500 - Internal Server Error");
}

#[tokio::test]
async fn failing_action_keeps_allow_origin() {
    let ctx = empty(request(Method::GET, "/users/boom").header("origin", "https://app.example"));
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(text(res).await, "500 - Internal Server Error");
}

#[tokio::test]
async fn preflight_from_listed_origin() {
    let ctx = empty(
        request(Method::OPTIONS, "/users")
            .header("origin", "https://app.example")
            .header("access-control-request-method", "POST"),
    );
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(res.headers()["access-control-allow-methods"], "POST");
    assert_eq!(text(res).await, "");
}

#[tokio::test]
async fn preflight_from_other_origin_has_no_cors_headers() {
    let ctx = empty(
        request(Method::OPTIONS, "/users")
            .header("origin", "https://elsewhere.example")
            .header("access-control-request-method", "POST"),
    );
    let (res, _) = send(ctx).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!res.headers().contains_key("access-control-allow-origin"));
    assert!(!res.headers().contains_key("vary"));
}

#[tokio::test]
async fn simple_request_gets_allow_origin() {
    let ctx = empty(request(Method::GET, "/users/1").header("origin", "https://app.example"));
    let (res, _) = send(ctx).await;
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example");
}
