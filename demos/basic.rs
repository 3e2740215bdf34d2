//! Minimal switchyard example: a REST controller over an in-memory map.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users
//!   curl -i http://localhost:3000/users/1
//!   curl -i -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -i -X PUT http://localhost:3000/users/1 -d '{}'        # 405, Allow: GET, HEAD, POST, DELETE
//!   curl -i http://localhost:3000/users/1 -H 'accept: text/html'      # 406
//!   curl -i -X OPTIONS http://localhost:3000/users \
//!        -H 'origin: http://localhost:8080' -H 'access-control-request-method: POST'

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use http::{Method, StatusCode};
use serde_json::{Value, json};
use switchyard::{ActionResult, App, Config, Context, Controller, CorsOrigin, Error, Router, Server, Signal};

type Store = Arc<Mutex<BTreeMap<u64, Value>>>;

static USERS: LazyLock<Store> = LazyLock::new(|| {
    let mut users = BTreeMap::new();
    users.insert(1, json!({ "id": 1, "name": "ada" }));
    Arc::new(Mutex::new(users))
});

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config {
        cors: vec![
            CorsOrigin::new("http://localhost:8080")
                .methods([Method::GET, Method::POST])
                .headers(["Content-Type"])
                .max_age(600),
        ],
        ..Config::default()
    };

    let users = Controller::rest()
        .on("list", list_users)
        .on("read", read_user)
        .on("create", create_user)
        .on("delete", delete_user);

    let app = App::new(Router::new().rest("/users/:id?", users))
        .cors(config.cors.clone())
        .body_timeout(config.body_timeout());

    if let Err(e) = Server::from_config(&config).serve(app).await {
        eprintln!("server error: {e}");
    }
}

fn id(ctx: &Context) -> Option<u64> {
    ctx.params()?.str("id")?.parse().ok()
}

// GET /users
async fn list_users(ctx: Context) -> Result<ActionResult, Error> {
    let users: Vec<Value> = USERS.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
    Ok(ActionResult::ok(ctx.with_view(Value::Array(users))))
}

// GET /users/:id
async fn read_user(ctx: Context) -> Result<ActionResult, Error> {
    let user = id(&ctx).and_then(|id| USERS.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned());
    match user {
        Some(user) => Ok(ActionResult::ok(ctx.with_view(user))),
        None => Ok(ActionResult::signal(Signal::NotFound, ctx)),
    }
}

// POST /users  → 201 with the stored record
async fn create_user(ctx: Context) -> Result<ActionResult, Error> {
    let Some(name) = ctx.request_body().and_then(|b| b.get("name")).and_then(Value::as_str) else {
        return Ok(ActionResult::signal(Signal::Malformed, ctx));
    };

    let user = {
        let mut users = USERS.lock().unwrap_or_else(PoisonError::into_inner);
        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = json!({ "id": id, "name": name });
        users.insert(id, user.clone());
        user
    };
    Ok(ActionResult::reply(StatusCode::CREATED, ctx.with_view(user)))
}

// DELETE /users/:id → 204
async fn delete_user(ctx: Context) -> Result<ActionResult, Error> {
    let removed = id(&ctx).and_then(|id| USERS.lock().unwrap_or_else(PoisonError::into_inner).remove(&id));
    match removed {
        Some(_) => Ok(ActionResult::reply(StatusCode::NO_CONTENT, ctx)),
        None => Ok(ActionResult::signal(Signal::NotFound, ctx)),
    }
}
