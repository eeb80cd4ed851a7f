use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USERNAME: &str = "foo";
pub const DEFAULT_PASSWORD: &str = "bar";
pub const OWN_USER_ID: &str = "12345";

const FIRST_APPLICATION_ID: u64 = 108000;
const FIRST_USER_ID: u64 = 12346;

type Object = Map<String, Value>;
type Failure = (StatusCode, String);
type Reply = Result<Json<Value>, Failure>;

#[derive(Default)]
pub struct Store {
    users: BTreeMap<String, Object>,
    applications: BTreeMap<u64, Object>,
    addresses: HashMap<u64, Vec<Object>>,
    invitations: BTreeMap<String, Object>,
    whitelists: HashMap<String, Vec<String>>,
    next_application_id: u64,
    next_user_id: u64,
}

#[derive(Clone)]
pub struct AppState {
    credentials: Arc<(String, String)>,
    store: Arc<RwLock<Store>>,
}

pub fn app() -> Router {
    app_with_credentials(DEFAULT_USERNAME, DEFAULT_PASSWORD)
}

/// Router accepting only `username`/`password` over Basic auth. The store
/// starts with one user, the authenticated account itself.
pub fn app_with_credentials(username: &str, password: &str) -> Router {
    let mut store = Store {
        next_application_id: FIRST_APPLICATION_ID,
        next_user_id: FIRST_USER_ID,
        ..Store::default()
    };
    let own_user = json!({
        "id": OWN_USER_ID,
        "username": username,
        "firstName": "Tropo",
        "lastName": "User",
        "city": "Orlando",
        "status": "active",
    });
    if let Value::Object(user) = own_user {
        store.users.insert(OWN_USER_ID.to_string(), user);
    }

    let state = AppState {
        credentials: Arc::new((username.to_string(), password.to_string())),
        store: Arc::new(RwLock::new(store)),
    };

    let v1 = Router::new()
        .route("/users", get(search_users).post(create_user))
        .route("/users/", get(search_users))
        .route("/users/{id}", get(get_user).put(update_user))
        .route("/users/{id}/confirmations", post(confirm_user))
        .route("/usernames/{name}", get(username_exists))
        .route("/applications", get(list_applications).post(create_application))
        .route(
            "/applications/{id}",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
        .route(
            "/applications/{id}/addresses",
            get(list_addresses).post(create_address),
        )
        .route(
            "/applications/{id}/addresses/{kind}/{address}",
            post(attach_address).delete(delete_address),
        )
        .route("/exchanges", get(exchanges))
        .route("/features", get(features))
        .route("/invitations", get(list_invitations).post(create_invitation))
        .route(
            "/invitations/{code}",
            get(get_invitation)
                .put(update_invitation)
                .delete(delete_invitation),
        )
        .route(
            "/users/partitions/production/platforms/sms/whitelist",
            get(own_whitelist).post(add_own_whitelist),
        )
        .route(
            "/users/partitions/production/platforms/sms/whitelist/{value}",
            axum::routing::delete(delete_own_whitelist),
        )
        .route(
            "/users/{id}/partitions/production/platforms/sms/whitelist",
            get(user_whitelist).post(add_user_whitelist),
        )
        .route(
            "/users/{id}/partitions/production/platforms/sms/whitelist/{value}",
            axum::routing::delete(delete_user_whitelist),
        );

    Router::new()
        .nest("/v1", v1)
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("{}:{}", state.credentials.0, state.credentials.1);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .is_some_and(|decoded| decoded == expected.as_bytes());
    if !authorized {
        info!(uri = %request.uri(), "rejecting request without valid credentials");
        return (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    }
    debug!(method = %request.method(), uri = %request.uri(), "request");
    next.run(request).await
}

fn href(headers: &HeaderMap, path: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/v1/{path}")
}

fn not_found(what: &str) -> Failure {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

fn bad_request(message: &str) -> Failure {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn text<'a>(body: &'a Object, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn parse_id(id: &str) -> Result<u64, Failure> {
    id.parse().map_err(|_| not_found("application"))
}

// --- users ---

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let store = state.store.read().await;
    store
        .users
        .get(&id)
        .or_else(|| store.users.values().find(|u| text(u, "username") == Some(id.as_str())))
        .map(|u| Json(Value::Object(u.clone())))
        .ok_or_else(|| not_found("user"))
}

async fn search_users(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<HashMap<String, String>>,
) -> Json<Value> {
    let store = state.store.read().await;
    let matches: Vec<Value> = store
        .users
        .values()
        .filter(|u| query.iter().all(|(k, v)| text(u, k) == Some(v.as_str())))
        .map(|u| Value::Object(u.clone()))
        .collect();
    Json(Value::Array(matches))
}

async fn create_user(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Object>) -> Reply {
    for required in ["username", "password", "email"] {
        if text(&body, required).is_none() {
            return Err(bad_request(&format!("{required} is required")));
        }
    }
    let mut store = state.store.write().await;
    let id = store.next_user_id.to_string();
    store.next_user_id += 1;

    let mut user = body;
    user.remove("password");
    user.insert("id".to_string(), Value::from(id.clone()));
    user.insert("status".to_string(), Value::from("pending"));
    store.users.insert(id.clone(), user);

    Ok(Json(json!({
        "href": href(&headers, &format!("users/{id}")),
        "confirmationKey": Uuid::new_v4().simple().to_string()[..8].to_string(),
    })))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Object>,
) -> Reply {
    let mut store = state.store.write().await;
    let user = store.users.get_mut(&id).ok_or_else(|| not_found("user"))?;
    user.extend(body);
    Ok(Json(json!({ "href": href(&headers, &format!("users/{id}")) })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub key: String,
    pub end_user_host: String,
}

async fn confirm_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(confirmation): Json<Confirmation>,
) -> Reply {
    if confirmation.key.is_empty() {
        return Err(bad_request("key is required"));
    }
    debug!(user = %id, host = %confirmation.end_user_host, "confirming user");
    let mut store = state.store.write().await;
    let user = store.users.get_mut(&id).ok_or_else(|| not_found("user"))?;
    user.insert("status".to_string(), Value::from("active"));
    Ok(Json(json!({ "message": format!("successfully confirmed user {id}") })))
}

async fn username_exists(State(state): State<AppState>, Path(name): Path<String>) -> Reply {
    let store = state.store.read().await;
    let taken = store
        .users
        .values()
        .any(|u| text(u, "username") == Some(name.as_str()));
    if taken {
        Ok(Json(json!({ "username": name, "available": false })))
    } else {
        Err(not_found("username"))
    }
}

// --- applications ---

async fn list_applications(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.read().await;
    Json(Value::Array(
        store
            .applications
            .values()
            .map(|a| Value::Object(a.clone()))
            .collect(),
    ))
}

async fn create_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Object>,
) -> Reply {
    if text(&body, "name").is_none() {
        return Err(bad_request("name is required"));
    }
    let mut store = state.store.write().await;
    let id = store.next_application_id;
    store.next_application_id += 1;

    let location = href(&headers, &format!("applications/{id}"));
    let mut application = body;
    application.insert("href".to_string(), Value::from(location.clone()));
    store.applications.insert(id, application);
    store.addresses.insert(id, Vec::new());
    Ok(Json(json!({ "href": location })))
}

async fn get_application(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let id = parse_id(&id)?;
    let store = state.store.read().await;
    store
        .applications
        .get(&id)
        .map(|a| Json(Value::Object(a.clone())))
        .ok_or_else(|| not_found("application"))
}

async fn update_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Object>,
) -> Reply {
    let id = parse_id(&id)?;
    let mut store = state.store.write().await;
    let application = store
        .applications
        .get_mut(&id)
        .ok_or_else(|| not_found("application"))?;
    application.extend(body.into_iter().filter(|(k, _)| k != "href"));
    Ok(Json(json!({ "href": application.get("href").cloned().unwrap_or(Value::Null) })))
}

/// Answers `204 No Content`, as the live service does for this call.
async fn delete_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Failure> {
    let id = parse_id(&id)?;
    let mut store = state.store.write().await;
    store
        .applications
        .remove(&id)
        .ok_or_else(|| not_found("application"))?;
    store.addresses.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

// --- addresses ---

async fn list_addresses(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let id = parse_id(&id)?;
    let store = state.store.read().await;
    store
        .addresses
        .get(&id)
        .map(|list| Json(Value::Array(list.iter().cloned().map(Value::Object).collect())))
        .ok_or_else(|| not_found("application"))
}

fn address_key(kind: &str) -> &'static str {
    match kind {
        "number" => "number",
        "token" => "token",
        "pin" => "pin",
        _ => "username",
    }
}

async fn create_address(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Object>,
) -> Reply {
    let app_id = parse_id(&id)?;
    let kind = text(&body, "type")
        .ok_or_else(|| bad_request("type is required"))?
        .to_string();
    let value = match kind.as_str() {
        "number" => {
            let prefix = text(&body, "prefix").unwrap_or("1407");
            format!("{prefix}{}", 5550000 + app_id % 10000)
        }
        "token" => Uuid::new_v4().simple().to_string(),
        _ => text(&body, "username")
            .ok_or_else(|| bad_request("username is required"))?
            .to_string(),
    };

    let mut store = state.store.write().await;
    let list = store
        .addresses
        .get_mut(&app_id)
        .ok_or_else(|| not_found("application"))?;
    let location = href(&headers, &format!("applications/{app_id}/addresses/{kind}/{value}"));
    let mut address = body;
    address.insert(address_key(&kind).to_string(), Value::from(value));
    address.insert("href".to_string(), Value::from(location.clone()));
    list.push(address);
    Ok(Json(json!({ "href": location })))
}

async fn attach_address(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, kind, address)): Path<(String, String, String)>,
) -> Reply {
    let app_id = parse_id(&id)?;
    let mut store = state.store.write().await;
    let list = store
        .addresses
        .get_mut(&app_id)
        .ok_or_else(|| not_found("application"))?;
    let location = href(&headers, &format!("applications/{app_id}/addresses/{kind}/{address}"));
    let mut entry = Object::new();
    entry.insert("type".to_string(), Value::from(kind.clone()));
    entry.insert(address_key(&kind).to_string(), Value::from(address));
    entry.insert("href".to_string(), Value::from(location.clone()));
    list.push(entry);
    Ok(Json(json!({ "href": location })))
}

async fn delete_address(
    State(state): State<AppState>,
    Path((id, kind, address)): Path<(String, String, String)>,
) -> Reply {
    let app_id = parse_id(&id)?;
    let mut store = state.store.write().await;
    let list = store
        .addresses
        .get_mut(&app_id)
        .ok_or_else(|| not_found("application"))?;
    let key = address_key(&kind);
    let before = list.len();
    list.retain(|a| text(a, key) != Some(address.as_str()));
    if list.len() == before {
        return Err(not_found("address"));
    }
    Ok(Json(json!({ "message": "delete successful" })))
}

// --- catalogue ---

async fn exchanges() -> Json<Value> {
    Json(json!([
        { "prefix": "1407", "city": "Orlando", "state": "FL", "country": "United States" },
        { "prefix": "1312", "city": "Chicago", "state": "IL", "country": "United States" },
        { "prefix": "1303", "city": "Denver", "state": "CO", "country": "United States" },
    ]))
}

async fn features(headers: HeaderMap) -> Json<Value> {
    Json(json!([
        { "id": "7", "name": "Test Outbound SMS", "href": href(&headers, "features/7"),
          "description": "Test Outbound SMS" },
        { "id": "8", "name": "Domestic Outbound SMS", "href": href(&headers, "features/8"),
          "description": "Domestic Outbound SMS" },
    ]))
}

// --- invitations ---

async fn list_invitations(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.read().await;
    Json(Value::Array(
        store
            .invitations
            .values()
            .map(|i| Value::Object(i.clone()))
            .collect(),
    ))
}

async fn create_invitation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Object>,
) -> Reply {
    let code = match text(&body, "code") {
        Some(code) => code.to_string(),
        None => Uuid::new_v4().simple().to_string()[..6].to_uppercase(),
    };
    let mut store = state.store.write().await;
    if store.invitations.contains_key(&code) {
        return Err((StatusCode::CONFLICT, format!("invitation {code} already exists")));
    }
    let location = href(&headers, &format!("invitations/{code}"));
    let mut invitation = body;
    invitation.insert("code".to_string(), Value::from(code.clone()));
    invitation.insert("href".to_string(), Value::from(location.clone()));
    store.invitations.insert(code, invitation);
    Ok(Json(json!({ "href": location })))
}

async fn get_invitation(State(state): State<AppState>, Path(code): Path<String>) -> Reply {
    let store = state.store.read().await;
    store
        .invitations
        .get(&code)
        .map(|i| Json(Value::Object(i.clone())))
        .ok_or_else(|| not_found("invitation"))
}

async fn update_invitation(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<Object>,
) -> Reply {
    let mut store = state.store.write().await;
    let invitation = store
        .invitations
        .get_mut(&code)
        .ok_or_else(|| not_found("invitation"))?;
    invitation.extend(body.into_iter().filter(|(k, _)| k != "code" && k != "href"));
    Ok(Json(json!({ "href": invitation.get("href").cloned().unwrap_or(Value::Null) })))
}

async fn delete_invitation(State(state): State<AppState>, Path(code): Path<String>) -> Reply {
    let mut store = state.store.write().await;
    store
        .invitations
        .remove(&code)
        .ok_or_else(|| not_found("invitation"))?;
    Ok(Json(json!({ "message": format!("deleted invitation {code}") })))
}

// --- SMS whitelist ---

async fn whitelist_for(state: &AppState, headers: &HeaderMap, user: &str) -> Json<Value> {
    let store = state.store.read().await;
    let entries = store.whitelists.get(user).cloned().unwrap_or_default();
    Json(Value::Array(
        entries
            .into_iter()
            .map(|value| {
                json!({
                    "href": href(headers, &format!("users/{user}/partitions/production/platforms/sms/whitelist/{value}")),
                    "value": value,
                })
            })
            .collect(),
    ))
}

async fn add_to_whitelist(state: &AppState, headers: &HeaderMap, user: &str, body: Object) -> Reply {
    let value = text(&body, "value")
        .ok_or_else(|| bad_request("value is required"))?
        .to_string();
    let mut store = state.store.write().await;
    store
        .whitelists
        .entry(user.to_string())
        .or_default()
        .push(value.clone());
    Ok(Json(json!({
        "href": href(headers, &format!("users/{user}/partitions/production/platforms/sms/whitelist/{value}")),
    })))
}

async fn own_whitelist(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    whitelist_for(&state, &headers, OWN_USER_ID).await
}

async fn add_own_whitelist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Object>,
) -> Reply {
    add_to_whitelist(&state, &headers, OWN_USER_ID, body).await
}

async fn user_whitelist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Json<Value> {
    whitelist_for(&state, &headers, &id).await
}

async fn add_user_whitelist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Object>,
) -> Reply {
    add_to_whitelist(&state, &headers, &id, body).await
}

async fn delete_own_whitelist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(value): Path<String>,
) -> Reply {
    remove_from_whitelist(&state, &headers, OWN_USER_ID, &value).await
}

async fn delete_user_whitelist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, value)): Path<(String, String)>,
) -> Reply {
    remove_from_whitelist(&state, &headers, &id, &value).await
}

async fn remove_from_whitelist(state: &AppState, headers: &HeaderMap, id: &str, value: &str) -> Reply {
    let mut store = state.store.write().await;
    let entries = store
        .whitelists
        .get_mut(id)
        .ok_or_else(|| not_found("whitelist"))?;
    let before = entries.len();
    entries.retain(|v| v.as_str() != value);
    if entries.len() == before {
        return Err(not_found("whitelist entry"));
    }
    Ok(Json(json!({
        "href": href(headers, &format!("users/{id}/partitions/production/platforms/sms/whitelist/{value}")),
    })))
}
