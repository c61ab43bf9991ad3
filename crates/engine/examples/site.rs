use async_trait::async_trait;
use http::StatusCode;
use micro_engine::{
    Engine, FilterHandler, Handler, HandlerResult, Next, Pattern, RequestContext, ResponseContext, RuleOptions, Server,
    ServerConfig, handler_fn,
};
use serde_json::json;

// curl -v http://127.0.0.1:8080/admin/users
struct RequireToken;

#[async_trait]
impl FilterHandler for RequireToken {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext, next: Next<'_>) -> HandlerResult {
        if req.headers().contains_key("x-token") {
            next.run(req, resp).await;
        } else {
            resp.status(StatusCode::UNAUTHORIZED).send_text("token required\r\n");
        }
        Ok(())
    }
}

// run with: cargo run --example site -- site.toml
#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path).unwrap(),
        None => ServerConfig::default(),
    };

    let engine = Engine::builder(config)
        .filter("/admin", RequireToken, RuleOptions::new())
        // curl -v http://127.0.0.1:8080/user/42?verbose=1
        .handler(
            "/user/:id",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    let id = req.param("id").unwrap_or_default().to_string();
                    resp.send_json(&json!({ "id": id }));
                    Ok(())
                })
            }),
            RuleOptions::new(),
        )
        // curl -v -c cookies.txt -b cookies.txt http://127.0.0.1:8080/visits
        .handler(
            "/visits",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    if let Some(session) = req.session_mut() {
                        let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
                        session.set("visits", visits);
                        resp.send_text(format!("visits: {visits}\r\n"));
                    }
                    Ok(())
                })
            }),
            RuleOptions::new().session(),
        )
        // curl -v -d '{"name":"hello"}' http://127.0.0.1:8080/echo
        .handler(
            "/echo",
            handler_fn(|req, resp| {
                Box::pin(async move {
                    let body = req.parsed_body().cloned().unwrap_or_default();
                    resp.send_json(&body);
                    Ok(())
                })
            }),
            RuleOptions::new().json(),
        )
        .handler(Pattern::list(["/about", "/team"]), Handler::content("<h1>about us</h1>"), RuleOptions::new())
        .build();

    Server::builder().engine(engine).build().unwrap().start().await.unwrap();
}
