//! End-to-end command flow against a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use astra::events::ClientEventKind;
use astra::timeouts::{Timeout, TimeoutDefaults};
use astra::{
    ClientOptions, DbOptions, Error, InsertManyOptions, SomeId,
};

use common::{ENDPOINT, ScriptedFetcher, scripted_client, scripted_db};

fn ok_insert(ids: Value) -> Value {
    json!({ "status": { "insertedIds": ids } })
}

#[tokio::test]
async fn insert_one_round_trips_a_v7_uuid_id() {
    let id = "018e5b4e-77f2-7db3-b2e4-9f6a3c1e8e55";
    let fetcher = ScriptedFetcher::new(vec![
        ok_insert(json!([{ "$uuid": id }])),
        json!({ "data": { "document": { "_id": { "$uuid": id }, "name": "t" } } }),
    ]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let inserted = collection.insert_one(&json!({ "name": "t" }), None).await.unwrap();
    let inserted_uuid = inserted.inserted_id.as_uuid().expect("uuid id");
    assert_eq!(inserted_uuid.version(), 7);

    let found = collection.find_one(json!({ "name": "t" }), None).await.unwrap().unwrap();
    let found_id: astra::DataApiUuid =
        serde_json::from_value(found["_id"].clone()).unwrap();
    assert_eq!(found_id, inserted_uuid);
}

#[tokio::test]
async fn insert_one_persists_a_null_id() {
    let fetcher = ScriptedFetcher::new(vec![ok_insert(json!([null]))]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let inserted = collection
        .insert_one(&json!({ "_id": null, "name": "t" }), None)
        .await
        .unwrap();
    assert_eq!(inserted.inserted_id, SomeId::Null);

    // The null id went out on the wire untouched.
    let body = &fetcher.request_bodies()[0];
    assert!(body["insertOne"]["document"]["_id"].is_null());
}

#[tokio::test]
async fn ordered_insert_many_reports_the_inserted_prefix() {
    // Seven documents with a duplicate id at index 3: the server inserts
    // a, b, c and fails on the duplicate.
    let fetcher = ScriptedFetcher::new(vec![json!({
        "status": { "insertedIds": ["a", "b", "c"] },
        "errors": [{ "errorCode": "DOCUMENT_ALREADY_EXISTS", "message": "Document already exists" }]
    })]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let documents: Vec<Value> = ["a", "b", "c", "a", "a", "d", "e"]
        .iter()
        .map(|id| json!({ "_id": id }))
        .collect();

    let error = collection
        .insert_many(
            &documents,
            InsertManyOptions {
                ordered: true,
                ..InsertManyOptions::default()
            },
        )
        .await
        .unwrap_err();

    match error {
        Error::InsertMany(e) => {
            assert_eq!(e.partial_result.inserted_count, 3);
            assert_eq!(
                e.partial_result.inserted_ids,
                vec![SomeId::from("a"), SomeId::from("b"), SomeId::from("c")]
            );
            assert_eq!(
                e.descriptors[0].error_code.as_deref(),
                Some("DOCUMENT_ALREADY_EXISTS")
            );
        }
        other => panic!("expected InsertMany error, got {other:?}"),
    }
}

#[tokio::test]
async fn twenty_documents_fit_one_request_and_twenty_one_take_two() {
    let ids: Vec<Value> = (0..20).map(|i| json!(i)).collect();
    let fetcher = ScriptedFetcher::new(vec![ok_insert(json!(ids))]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let twenty: Vec<Value> = (0..20).map(|i| json!({ "_id": i })).collect();
    collection
        .insert_many(&twenty, InsertManyOptions { ordered: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(fetcher.requests().len(), 1);

    let fetcher = ScriptedFetcher::new(vec![
        ok_insert(json!((0..20).collect::<Vec<i64>>())),
        ok_insert(json!([20])),
    ]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let twenty_one: Vec<Value> = (0..21).map(|i| json!({ "_id": i })).collect();
    let result = collection
        .insert_many(&twenty_one, InsertManyOptions { ordered: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(fetcher.requests().len(), 2);
    assert_eq!(result.inserted_count, 21);
}

#[tokio::test]
async fn per_call_override_binds_the_attempt_deadline() {
    // Base: request 10s, general 30s. The per-call partial descriptor
    // lowers the method budget to 2s, which then binds the attempt.
    let fetcher = ScriptedFetcher::new(vec![json!({ "data": { "document": null } })]);
    let db = scripted_client(Arc::clone(&fetcher), ClientOptions::empty())
        .db_with_options(
            ENDPOINT,
            DbOptions::empty().token("t").timeout_defaults(TimeoutDefaults {
                request_timeout_ms: Some(10_000),
                general_method_timeout_ms: Some(30_000),
                ..TimeoutDefaults::empty()
            }),
        )
        .unwrap();
    let collection = db.collection::<Value>("c").unwrap();

    collection
        .find_one(
            json!({}),
            Some(astra::FindOneOptions {
                timeout: Some(Timeout::Defaults(TimeoutDefaults {
                    general_method_timeout_ms: Some(2_000),
                    ..TimeoutDefaults::empty()
                })),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.requests()[0].timeout, Duration::from_millis(2_000));
}

#[tokio::test]
async fn every_command_emits_started_then_exactly_one_terminal_event() {
    let fetcher = ScriptedFetcher::new(vec![
        ok_insert(json!(["a"])),
        json!({ "errors": [{ "message": "boom" }] }),
    ]);
    let client = scripted_client(Arc::clone(&fetcher), ClientOptions::empty());
    let db = client
        .db_with_options(ENDPOINT, DbOptions::empty().token("t"))
        .unwrap();
    let collection = db.collection::<Value>("c").unwrap();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let mut subs = Vec::new();
    for kind in [
        ClientEventKind::CommandStarted,
        ClientEventKind::CommandSucceeded,
        ClientEventKind::CommandFailed,
        ClientEventKind::CommandWarnings,
    ] {
        let kinds = Arc::clone(&kinds);
        subs.push(client.on(kind, move |event, _| {
            kinds.lock().push(event.kind);
        }));
    }

    collection.insert_one(&json!({ "_id": "a" }), None).await.unwrap();
    let _ = collection.insert_one(&json!({ "_id": "a" }), None).await.unwrap_err();

    assert_eq!(
        *kinds.lock(),
        vec![
            ClientEventKind::CommandStarted,
            ClientEventKind::CommandSucceeded,
            ClientEventKind::CommandStarted,
            ClientEventKind::CommandFailed,
        ]
    );
}

#[tokio::test]
async fn warnings_in_the_response_emit_a_warnings_event() {
    let fetcher = ScriptedFetcher::new(vec![json!({
        "status": {
            "count": 1,
            "warnings": [{ "errorCode": "ZERO_FILTER_OPERATIONS", "message": "full scan" }]
        }
    })]);
    let client = scripted_client(Arc::clone(&fetcher), ClientOptions::empty());
    let db = client
        .db_with_options(ENDPOINT, DbOptions::empty().token("t"))
        .unwrap();
    let collection = db.collection::<Value>("c").unwrap();

    let warned = Arc::new(Mutex::new(Vec::new()));
    let warned_clone = Arc::clone(&warned);
    let _sub = client.on(ClientEventKind::CommandWarnings, move |event, _| {
        warned_clone.lock().push(event.warnings.clone().unwrap_or_default().len());
    });

    collection.count_documents(json!({}), 1_000, None).await.unwrap();
    assert_eq!(*warned.lock(), vec![1]);
}

#[tokio::test]
async fn requests_carry_exactly_one_user_agent_and_the_token_header() {
    let fetcher = ScriptedFetcher::new(vec![ok_insert(json!(["a"]))]);
    let options = ClientOptions::empty().caller("integration-suite", Some("0.1"));
    let db = scripted_db(Arc::clone(&fetcher), options);
    let collection = db.collection::<Value>("c").unwrap();

    collection.insert_one(&json!({ "_id": "a" }), None).await.unwrap();

    let request = &fetcher.requests()[0];
    let user_agent = request.headers.get("User-Agent").expect("user agent");
    assert!(user_agent.starts_with("integration-suite/0.1 "));
    assert!(user_agent.contains("astra-db-rs/"));
    assert_eq!(request.headers.get("Token").map(String::as_str), Some("AstraCS:test"));
    assert_eq!(
        request.url,
        format!("{ENDPOINT}/api/json/v1/default_keyspace/c")
    );
}

#[tokio::test]
async fn server_validation_errors_surface_as_response_errors() {
    let fetcher = ScriptedFetcher::new(vec![json!({
        "errors": [{
            "errorCode": "INVALID_FILTER_EXPRESSION",
            "message": "Invalid filter expression: $invalid"
        }]
    })]);
    let db = scripted_db(Arc::clone(&fetcher), ClientOptions::empty());
    let collection = db.collection::<Value>("c").unwrap();

    let error = collection
        .find_one(json!({ "$invalid": 1 }), None)
        .await
        .unwrap_err();
    match error {
        Error::DataApiResponse(e) => {
            assert!(e.message.contains("$invalid"));
            assert_eq!(e.errors.len(), 1);
        }
        other => panic!("expected DataApiResponse, got {other:?}"),
    }
}
