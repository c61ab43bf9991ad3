use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, DATE, IF_MODIFIED_SINCE, LAST_MODIFIED, LOCATION, SET_COOKIE};
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use micro_engine::{
    Engine, FilterHandler, Handler, HandlerResult, Next, Pattern, RequestContext, RequestHandler, ResponseContext, RuleOptions,
    ServerConfig, filter_fn, handler_fn,
};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

async fn send(engine: &Engine, request: Request<Full<Bytes>>) -> Reply {
    let response = engine.handle(request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Reply { status, headers, body: String::from_utf8(body.to_vec()).unwrap() }
}

fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::get(uri).body(Full::new(Bytes::new())).unwrap()
}

fn config_at(home: &Path) -> ServerConfig {
    ServerConfig { root: home.to_path_buf(), home: home.to_path_buf(), ..ServerConfig::default() }
}

fn session_id(reply: &Reply) -> Option<String> {
    let line = reply.headers.get(SET_COOKIE)?.to_str().ok()?;
    let pair = line.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    (name == "SESSIONID").then(|| value.to_string())
}

#[tokio::test]
async fn path_params_ignore_query() {
    let engine = Engine::builder(ServerConfig::default())
        .handler(
            "/home/:id",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    let id = req.param("id").unwrap_or_default().to_string();
                    resp.send(id);
                    Ok(())
                })
            }),
            RuleOptions::new(),
        )
        .build();

    let reply = send(&engine, get("/home/42?x=1")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "42");
    assert!(reply.headers.contains_key(DATE));
}

#[tokio::test]
async fn session_counter_survives_requests() {
    let engine = Engine::builder(ServerConfig::default())
        .handler(
            "/count",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    if let Some(session) = req.session_mut() {
                        let counter = session.get_as::<u64>("counter").unwrap_or(0) + 1;
                        session.set("counter", counter);
                        resp.send(counter.to_string());
                    }
                    Ok(())
                })
            }),
            RuleOptions::new().session(),
        )
        .build();

    let first = send(&engine, get("/count")).await;
    assert_eq!(first.body, "1");
    let id = session_id(&first).unwrap();
    assert_eq!(id.len(), engine.config().session_length);

    let second = Request::get("/count").header("cookie", format!("SESSIONID={id}")).body(Full::new(Bytes::new())).unwrap();
    let second = send(&engine, second).await;
    assert_eq!(second.body, "2");
    assert!(second.headers.get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn missing_file_is_plain_404() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = Engine::builder(config_at(tmp.path())).build();

    let reply = send(&engine, get("/nothing/here.html")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, "File not found!");
}

#[tokio::test]
async fn missing_file_renders_configured_template() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("404.html"), "<h1>no {{ path }}</h1>").unwrap();
    let config = ServerConfig { not_found: Some("/404.html".into()), ..config_at(tmp.path()) };
    let engine = Engine::builder(config).build();

    let reply = send(&engine, get("/nope?x=1")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, "<h1>no /nope</h1>");
}

#[tokio::test]
async fn conditional_get() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("style.css");
    std::fs::write(&file, "body{}").unwrap();
    let modified = std::fs::metadata(&file).unwrap().modified().unwrap();
    let engine = Engine::builder(config_at(tmp.path())).build();

    let fresh = Request::get("/style.css")
        .header(IF_MODIFIED_SINCE, httpdate::fmt_http_date(modified + Duration::from_secs(5)))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let reply = send(&engine, fresh).await;
    assert_eq!(reply.status, StatusCode::NOT_MODIFIED);
    assert!(reply.body.is_empty());

    let stale = Request::get("/style.css")
        .header(IF_MODIFIED_SINCE, httpdate::fmt_http_date(modified - Duration::from_secs(60)))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let reply = send(&engine, stale).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "body{}");
    assert_eq!(reply.headers[CONTENT_TYPE], "text/css; charset=utf-8");
    assert_eq!(reply.headers[LAST_MODIFIED], httpdate::fmt_http_date(modified).as_str());
}

#[tokio::test]
async fn conditional_get_without_cache_always_sends() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("a.txt");
    std::fs::write(&file, "a").unwrap();
    let modified = std::fs::metadata(&file).unwrap().modified().unwrap();
    let engine = Engine::builder(ServerConfig { cache: false, ..config_at(tmp.path()) }).build();

    let request = Request::get("/a.txt")
        .header(IF_MODIFIED_SINCE, httpdate::fmt_http_date(modified + Duration::from_secs(5)))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let reply = send(&engine, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "a");
}

#[tokio::test]
async fn directories() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("docs")).unwrap();
    std::fs::write(tmp.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
    std::fs::create_dir(tmp.path().join("raw")).unwrap();
    std::fs::write(tmp.path().join("raw/data.csv"), "a,b").unwrap();

    let engine = Engine::builder(config_at(tmp.path())).build();
    let reply = send(&engine, get("/docs?v=1")).await;
    assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(reply.headers[LOCATION], "/docs/?v=1");

    let reply = send(&engine, get("/docs/")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "<h1>docs</h1>");

    let reply = send(&engine, get("/raw/")).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let listing = Engine::builder(ServerConfig { list_dir: true, ..config_at(tmp.path()) }).build();
    let reply = send(&listing, get("/raw/")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("href=\"/raw/data.csv\""));
}

#[tokio::test]
async fn parent_segments_are_not_served() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("public")).unwrap();
    std::fs::write(tmp.path().join("secret.txt"), "secret").unwrap();
    let engine = Engine::builder(config_at(&tmp.path().join("public"))).build();

    let reply = send(&engine, get("/%2e%2e/secret.txt")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

fn tracing_filter(mark: &'static str, proceed: bool) -> impl FilterHandler {
    filter_fn(move |req, resp, next| {
        Box::pin(async move {
            let trail = req.extensions().get::<String>().cloned().unwrap_or_default();
            req.extensions_mut().insert(format!("{trail}{mark}"));
            if proceed {
                next.run(req, resp).await;
            } else {
                resp.status(StatusCode::UNAUTHORIZED).send_text(format!("stopped at {mark}"));
            }
            Ok(())
        })
    })
}

struct Trail;

#[async_trait]
impl FilterHandler for Trail {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext, next: Next<'_>) -> HandlerResult {
        let trail = req.extensions().get::<String>().cloned().unwrap_or_default();
        req.extensions_mut().insert(format!("{trail}>"));
        next.run(req, resp).await;
        Ok(())
    }
}

struct ShowTrail;

#[async_trait]
impl RequestHandler for ShowTrail {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext) -> HandlerResult {
        let trail = req.extensions().get::<String>().cloned().unwrap_or_default();
        let title = req.body_field("title").unwrap_or("-").to_string();
        resp.send_text(format!("{trail}|{title}"));
        Ok(())
    }
}

#[tokio::test]
async fn filters_continue_only_through_next() {
    let engine = Engine::builder(ServerConfig::default())
        .filter("/admin", tracing_filter("admin", false), RuleOptions::new())
        .filter(Pattern::Any, Trail, RuleOptions::new())
        .handler(Pattern::Any, ShowTrail, RuleOptions::new())
        .build();

    let reply = send(&engine, get("/site/admin/users")).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, "stopped at admin");

    let reply = send(&engine, get("/site/public")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, ">|-");
}

#[tokio::test]
async fn upload_filters_run_first() {
    let engine = Engine::builder(ServerConfig::default())
        .filter(Pattern::Any, Trail, RuleOptions::new())
        .filter("/upload", tracing_filter("U", true), RuleOptions::new().upload())
        .handler("/upload", ShowTrail, RuleOptions::new())
        .build();

    let request = Request::post("/upload")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from_static(b"title=report")))
        .unwrap();
    let reply = send(&engine, request).await;
    assert_eq!(reply.body, "U>|report");
}

#[tokio::test]
async fn failing_upload_decode_is_400() {
    let engine = Engine::builder(ServerConfig::default())
        .handler("/upload", ShowTrail, RuleOptions::new().upload())
        .build();

    let request = Request::post("/upload")
        .header(CONTENT_TYPE, "multipart/form-data; boundary=x")
        .body(Full::new(Bytes::from_static(b"--x--")))
        .unwrap();
    assert_eq!(send(&engine, request).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn precheck_rejects() {
    let engine = Engine::builder(ServerConfig::default())
        .handler("/private", ShowTrail, RuleOptions::new().precheck(|req| req.headers().contains_key("x-token")))
        .build();

    assert_eq!(send(&engine, get("/private")).await.status, StatusCode::FORBIDDEN);

    let allowed = Request::get("/private").header("x-token", "t").body(Full::new(Bytes::new())).unwrap();
    assert_eq!(send(&engine, allowed).await.status, StatusCode::OK);
}

struct Failing;

#[async_trait]
impl RequestHandler for Failing {
    async fn invoke(&self, _req: &mut RequestContext, resp: &mut ResponseContext) -> HandlerResult {
        resp.send("partial");
        Err("database is down".into())
    }
}

#[tokio::test]
async fn handler_errors_respect_show_error() {
    let hidden = Engine::builder(ServerConfig::default()).handler("/fail", Failing, RuleOptions::new()).build();
    let reply = send(&hidden, get("/fail")).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.is_empty());

    let shown = Engine::builder(ServerConfig { show_error: true, ..ServerConfig::default() })
        .handler("/fail", Failing, RuleOptions::new())
        .build();
    let reply = send(&shown, get("/fail")).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.contains("database is down"));
}

struct FailsAfterNext;

#[async_trait]
impl FilterHandler for FailsAfterNext {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext, next: Next<'_>) -> HandlerResult {
        next.run(req, resp).await;
        Err("audit log unavailable".into())
    }
}

struct FailsBeforeNext;

#[async_trait]
impl FilterHandler for FailsBeforeNext {
    async fn invoke(&self, _req: &mut RequestContext, _resp: &mut ResponseContext, _next: Next<'_>) -> HandlerResult {
        Err("rate limiter unavailable".into())
    }
}

#[tokio::test]
async fn filter_errors_keep_completed_responses() {
    let engine = Engine::builder(ServerConfig { show_error: true, ..ServerConfig::default() })
        .filter("/page", FailsAfterNext, RuleOptions::new())
        .filter("/broken", FailsBeforeNext, RuleOptions::new())
        .handler(Pattern::Any, Handler::content("<p>done</p>"), RuleOptions::new())
        .build();

    let reply = send(&engine, get("/page")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "<p>done</p>");

    let reply = send(&engine, get("/broken")).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.contains("rate limiter unavailable"));
}

#[tokio::test]
async fn json_body_is_parsed() {
    let engine = Engine::builder(ServerConfig::default())
        .handler(
            "/echo",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    let body = req.parsed_body().cloned().unwrap_or_default();
                    resp.send_json(&json!({ "got": body }));
                    Ok(())
                })
            }),
            RuleOptions::new().json(),
        )
        .build();

    let request = Request::post("/echo").body(Full::new(Bytes::from_static(br#"{"a":1}"#))).unwrap();
    let reply = send(&engine, request).await;
    assert_eq!(reply.headers[CONTENT_TYPE], "application/json");
    assert_eq!(serde_json::from_str::<serde_json::Value>(&reply.body).unwrap(), json!({"got": {"a": 1}}));

    let request = Request::post("/echo").body(Full::new(Bytes::from_static(b"not json"))).unwrap();
    let reply = send(&engine, request).await;
    assert_eq!(serde_json::from_str::<serde_json::Value>(&reply.body).unwrap(), json!({"got": {}}));
}

#[tokio::test]
async fn handlers_render_templates_with_includes() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("page.html"), "{{> header.html }}<p>{{ text }}</p>").unwrap();
    std::fs::write(tmp.path().join("header.html"), "<h1>{{ site }}</h1>").unwrap();

    let engine = Engine::builder(config_at(tmp.path()))
        .handler(
            "/page.html",
            handler_fn(|_req, resp| {
                Box::pin(async move {
                    resp.render_path(&json!({ "text": "hello" })).await;
                    Ok(())
                })
            }),
            RuleOptions::new(),
        )
        .build();
    engine.templates().set_model(json!({ "site": "micro" }));

    let reply = send(&engine, get("/page.html?x=1")).await;
    assert_eq!(reply.body, "<h1>micro</h1><p>hello</p>");
}

#[tokio::test]
async fn literal_and_regex_handlers() {
    let engine = Engine::builder(ServerConfig::default())
        .handler(Pattern::regex(r"^/archive/(?P<year>\d{4})").unwrap(), ShowYear, RuleOptions::new())
        .handler(Pattern::list(["/about", "/team"]), Handler::content("<p>us</p>"), RuleOptions::new())
        .build();

    assert_eq!(send(&engine, get("/archive/2024/05")).await.body, "2024");
    assert_eq!(send(&engine, get("/team")).await.body, "<p>us</p>");
}

struct ShowYear;

#[async_trait]
impl RequestHandler for ShowYear {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext) -> HandlerResult {
        let year = req.param("year").unwrap_or_default().to_string();
        resp.send(year);
        Ok(())
    }
}

struct Stalled;

#[async_trait]
impl RequestHandler for Stalled {
    async fn invoke(&self, _req: &mut RequestContext, _resp: &mut ResponseContext) -> HandlerResult {
        futures::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn slow_requests_time_out() {
    let engine = Engine::builder(ServerConfig { request_timeout: 1, ..ServerConfig::default() })
        .handler("/slow", Stalled, RuleOptions::new())
        .build();

    let reply = send(&engine, get("/slow")).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(reply.headers.contains_key(DATE));
}
