//! Integration tests for the sync endpoint over its HTTP surface.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use syncline_storage::MemoryRemoteStore;
use syncline_sync_protocol::{ManualClock, PageToken};
use syncline_sync_server::{HttpRequest, ServerConfig, SyncServer};
use syncline_testkit::init_tracing;

struct Endpoint {
    server: SyncServer,
    store: Arc<MemoryRemoteStore>,
    clock: Arc<ManualClock>,
}

fn endpoint_with(config: ServerConfig, store: MemoryRemoteStore) -> Endpoint {
    init_tracing();
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(10_000));
    let server = SyncServer::with_parts(config, store.clone(), clock.clone());
    Endpoint {
        server,
        store,
        clock,
    }
}

fn endpoint() -> Endpoint {
    endpoint_with(ServerConfig::default(), MemoryRemoteStore::new())
}

fn todo(id: &str, updated_at: i64) -> Value {
    json!({
        "id": id,
        "title": format!("todo {id}"),
        "completed": false,
        "createdAt": updated_at,
        "updatedAt": updated_at,
        "deletedAt": null
    })
}

fn post(endpoint: &Endpoint, entity_type: &str, body: Value) -> (u16, Value) {
    let request = HttpRequest::post(
        format!("/sync/{entity_type}"),
        serde_json::to_vec(&body).unwrap(),
    );
    let response = endpoint.server.handle(&request);
    (
        response.status,
        serde_json::from_slice(&response.body).unwrap(),
    )
}

fn seed(endpoint: &Endpoint, count: usize) {
    let items: Vec<Value> = (0..count)
        .map(|i| todo(&format!("t{i:04}"), 100 + i as i64))
        .collect();
    let (status, body) = post(endpoint, "todos", json!({ "items": items }));
    assert_eq!(status, 200);
    assert_eq!(body["synced"], count as u64);
}

fn ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn push_then_pull_round_trip() {
    let endpoint = endpoint();
    let (status, body) = post(
        &endpoint,
        "todos",
        json!({"lastSyncTimestamp": null, "items": [todo("a", 10), todo("b", 20)]}),
    );
    assert_eq!(status, 200);
    assert_eq!(body["synced"], 2);
    assert_eq!(body["syncTimestamp"], 10_000);
    assert_eq!(body["hasMore"], false);
    assert!(body.get("nextPageToken").is_none());
    assert_eq!(ids(&body), vec!["a", "b"]);
    assert!(body["items"][0].get("entityType").is_none());
    assert_eq!(body["items"][0]["title"], "todo a");

    assert_eq!(endpoint.store.len(), 2);
}

#[test]
fn sync_timestamp_follows_server_clock() {
    let endpoint = endpoint();
    endpoint.clock.set(77_000);
    let (_, body) = post(&endpoint, "todos", json!({}));
    assert_eq!(body["syncTimestamp"], 77_000);
}

#[test]
fn last_write_overwrites_row() {
    let endpoint = endpoint();
    post(&endpoint, "todos", json!({"items": [todo("a", 10)]}));
    let mut newer = todo("a", 50);
    newer["title"] = json!("renamed");
    post(&endpoint, "todos", json!({"items": [newer]}));

    let (_, body) = post(&endpoint, "todos", json!({"lastSyncTimestamp": 0}));
    assert_eq!(ids(&body), vec!["a"]);
    assert_eq!(body["items"][0]["title"], "renamed");
    assert_eq!(body["items"][0]["updatedAt"], 50);
}

#[test]
fn older_push_still_replaces_newer_row() {
    let endpoint = endpoint();
    post(&endpoint, "todos", json!({"items": [todo("a", 50)]}));
    let mut older = todo("a", 10);
    older["title"] = json!("older");
    let (_, body) = post(&endpoint, "todos", json!({"items": [older]}));
    assert_eq!(body["synced"], 1);

    let (_, body) = post(&endpoint, "todos", json!({}));
    assert_eq!(ids(&body), vec!["a"]);
    assert_eq!(body["items"][0]["title"], "older");
    assert_eq!(body["items"][0]["updatedAt"], 10);
    assert_eq!(endpoint.store.get("todos", "a").unwrap().updated_at, 10);
}

#[test]
fn entity_types_are_partitioned() {
    let endpoint = endpoint();
    post(&endpoint, "todos", json!({"items": [todo("a", 10)]}));
    post(&endpoint, "notes", json!({"items": [todo("a", 10), todo("n", 11)]}));

    let (_, todos) = post(&endpoint, "todos", json!({}));
    let (_, notes) = post(&endpoint, "notes", json!({}));
    assert_eq!(ids(&todos), vec!["a"]);
    assert_eq!(ids(&notes), vec!["a", "n"]);
}

#[test]
fn tombstones_are_returned_to_clients() {
    let endpoint = endpoint();
    let mut deleted = todo("gone", 30);
    deleted["deletedAt"] = json!(30);
    post(&endpoint, "todos", json!({"items": [deleted]}));

    let (_, body) = post(&endpoint, "todos", json!({"lastSyncTimestamp": 20}));
    assert_eq!(body["items"][0]["deletedAt"], 30);
}

#[test]
fn token_pagination_covers_result_set() {
    let endpoint = endpoint();
    seed(&endpoint, 250);

    let mut seen = Vec::new();
    let mut flags = Vec::new();
    let mut token: Option<String> = None;
    let mut page = 0;
    loop {
        let mut request = json!({"lastSyncTimestamp": 0, "page": page, "pageSize": 100});
        if let Some(token) = token.take() {
            request["pageToken"] = json!(token);
        }
        let (status, body) = post(&endpoint, "todos", request);
        assert_eq!(status, 200);
        assert_eq!(body["page"], page);
        assert_eq!(body["pageSize"], 100);

        let has_more = body["hasMore"].as_bool().unwrap();
        assert_eq!(has_more, body.get("nextPageToken").is_some());
        flags.push(has_more);
        seen.extend(ids(&body));
        if !has_more {
            break;
        }
        token = body["nextPageToken"].as_str().map(str::to_string);
        page += 1;
    }

    assert_eq!(flags, vec![true, true, false]);
    assert_eq!(seen.len(), 250);
    assert_eq!(seen.iter().collect::<BTreeSet<_>>().len(), 250);
    assert_eq!(seen.first().map(String::as_str), Some("t0000"));
    assert_eq!(seen.last().map(String::as_str), Some("t0249"));
}

#[test]
fn page_number_alone_matches_token_pages() {
    let endpoint = endpoint();
    seed(&endpoint, 250);

    let pages: Vec<Vec<String>> = (0..3)
        .map(|page| {
            let (_, body) = post(
                &endpoint,
                "todos",
                json!({"lastSyncTimestamp": 0, "page": page, "pageSize": 100}),
            );
            ids(&body)
        })
        .collect();

    assert_eq!(pages[0].len(), 100);
    assert_eq!(pages[1][0], "t0100");
    assert_eq!(pages[2].len(), 50);

    let (_, beyond) = post(
        &endpoint,
        "todos",
        json!({"lastSyncTimestamp": 0, "page": 9, "pageSize": 100}),
    );
    assert!(ids(&beyond).is_empty());
    assert_eq!(beyond["hasMore"], false);
}

#[test]
fn pages_stitch_small_store_pages() {
    let endpoint = endpoint_with(
        ServerConfig::default(),
        MemoryRemoteStore::new().with_page_limit(7),
    );
    seed(&endpoint, 30);

    let (_, body) = post(&endpoint, "todos", json!({"pageSize": 20}));
    assert_eq!(ids(&body).len(), 20);
    assert_eq!(body["hasMore"], true);

    let token = PageToken::decode(body["nextPageToken"].as_str().unwrap()).unwrap();
    assert_eq!(token, PageToken::new(119, "t0019"));
}

#[test]
fn oversized_push_is_split_into_bounded_writes() {
    let endpoint = endpoint();
    seed(&endpoint, 60);
    assert_eq!(endpoint.store.batch_write_calls(), 3);
}

#[test]
fn throttled_items_are_retried() {
    let endpoint = endpoint();
    endpoint.store.throttle_writes(4);
    seed(&endpoint, 10);
    assert_eq!(endpoint.store.len(), 10);
    assert_eq!(endpoint.store.batch_write_calls(), 2);
}

#[test]
fn exhausted_retries_report_unprocessed_ids() {
    let config = ServerConfig::default().with_max_write_retries(1);
    let endpoint = endpoint_with(config, MemoryRemoteStore::new());
    endpoint.store.throttle_writes(4);

    let (status, body) = post(
        &endpoint,
        "todos",
        json!({"items": [todo("a", 1), todo("b", 2), todo("c", 3)]}),
    );
    assert_eq!(status, 200);
    assert_eq!(body["synced"], 2);
    assert_eq!(body["unprocessed"], json!(["a"]));
}

#[test]
fn invalid_token_is_rejected() {
    let endpoint = endpoint();
    let (status, body) = post(&endpoint, "todos", json!({"pageToken": "zz"}));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_request");
}

#[test]
fn auth_requires_valid_bearer() {
    let config = ServerConfig::default().with_auth(b"endpoint-secret".to_vec());
    let endpoint = endpoint_with(config, MemoryRemoteStore::new());

    let request = HttpRequest::post("/sync/todos", b"{}".to_vec()).with_bearer("deadbeef");
    assert_eq!(endpoint.server.handle(&request).status, 401);

    let token = endpoint
        .server
        .token_validator()
        .unwrap()
        .create_token_at("device-1", 10_000)
        .unwrap();
    let request = HttpRequest::post("/sync/todos", b"{}".to_vec()).with_bearer(token);
    assert_eq!(endpoint.server.handle(&request).status, 200);
}
