// HTTP-level tests of the remote clients against a mock server

use lotus_common::types::{NaturalKey, Reference};
use lotus_common::{ErrorKind, LotusError};
use lotus_import::publish::{Document, Publisher};
use lotus_import::reconcile::{
    BatchResolver, FeedbackHeaders, HttpTransport, KeyProperty, RateLimiter, RemoteApiClient, RetryPolicy,
};
use lotus_import::remote::crossref::CrossrefClient;
use lotus_import::remote::sparql::{SparqlQueryStore, WikibaseDialect, SPARQL_RESULTS_JSON};
use lotus_import::remote::wikibase::{Credentials, WikibasePublisher};
use lotus_import::remote::QueryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(name: &str, feedback: Option<FeedbackHeaders>) -> Arc<RemoteApiClient> {
    let transport = HttpTransport::new("lotus-import-tests", Duration::from_secs(5)).unwrap();
    let mut limiter = RateLimiter::new(name, Duration::ZERO);
    if let Some(headers) = feedback {
        limiter = limiter.with_feedback(headers);
    }
    Arc::new(
        RemoteApiClient::new(name, Arc::new(transport), limiter)
            .with_retry(RetryPolicy::new(2, Duration::ZERO).recovering([ErrorKind::Network, ErrorKind::RateLimitExceeded])),
    )
}

fn binding(value: &str, item: &str) -> serde_json::Value {
    json!({
        "value": { "type": "literal", "value": value },
        "item": { "type": "uri", "value": format!("http://www.wikidata.org/entity/{}", item) },
    })
}

fn sparql_results(bindings: Vec<serde_json::Value>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", SPARQL_RESULTS_JSON)
        .set_body_json(json!({ "head": { "vars": ["value", "item"] }, "results": { "bindings": bindings } }))
}

// ============================================================================
// SPARQL store
// ============================================================================

#[tokio::test]
async fn test_select_posts_query_and_reads_bindings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .and(header("accept", SPARQL_RESULTS_JSON))
        .and(body_string_contains("query="))
        .respond_with(sparql_results(vec![binding("Ginkgo biloba", "Q43284")]))
        .expect(1)
        .mount(&server)
        .await;

    let store = SparqlQueryStore::new(client("sparql", None), format!("{}/sparql", server.uri()));
    let solutions = store.select("SELECT ?value ?item WHERE { }").await.unwrap();

    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["value"], "Ginkgo biloba");
    assert_eq!(solutions[0]["item"], "http://www.wikidata.org/entity/Q43284");
}

#[tokio::test]
async fn test_ask_reads_boolean() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "head": {}, "boolean": true })))
        .mount(&server)
        .await;

    let store = SparqlQueryStore::new(client("sparql", None), format!("{}/sparql", server.uri()));
    assert!(store.ask("ASK { ?s ?p ?o }").await.unwrap());
}

#[tokio::test]
async fn test_server_errors_are_retried_then_reported_as_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let store = SparqlQueryStore::new(client("sparql", None), format!("{}/sparql", server.uri()));
    let err = store.select("SELECT * WHERE { }").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_bad_query_is_rejected_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Parse error"))
        .expect(1)
        .mount(&server)
        .await;

    let store = SparqlQueryStore::new(client("sparql", None), format!("{}/sparql", server.uri()));
    let err = store.select("SELECT nonsense").await.unwrap_err();
    assert!(matches!(err, LotusError::Remote { status: 400, .. }));
}

#[tokio::test]
async fn test_resolver_issues_one_request_per_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("10.1%2FA"))
        .respond_with(sparql_results(vec![binding("10.1/A", "Q1")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("10.1%2FB"))
        .respond_with(sparql_results(vec![binding("10.1/B", "Q2")]))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(SparqlQueryStore::new(client("sparql", None), format!("{}/sparql", server.uri())));
    let resolver = BatchResolver::new(store, Arc::new(WikibaseDialect::default()));
    let keys = [NaturalKey::new("10.1/a"), NaturalKey::new("10.1/b")];

    let mut chunks = 0;
    let result = resolver
        .resolve_by_property(&KeyProperty::doi(), &keys, 1, |_| chunks += 1)
        .await
        .unwrap();

    assert_eq!(chunks, 2);
    assert_eq!(result.get(&keys[0]).unwrap()[0].as_str(), "Q1");
    assert_eq!(result.get(&keys[1]).unwrap()[0].as_str(), "Q2");
}

// ============================================================================
// CrossRef
// ============================================================================

#[tokio::test]
async fn test_crossref_work_and_feedback_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/10.1021/np0497301"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-rate-limit-limit", "50")
                .insert_header("x-rate-limit-interval", "1s")
                .set_body_json(json!({
                    "status": "ok",
                    "message": {
                        "title": ["Ginkgolides from Ginkgo biloba"],
                        "container-title": ["Journal of Natural Products"],
                        "issued": { "date-parts": [[2004, 6]] },
                    },
                })),
        )
        .mount(&server)
        .await;

    let api = client("crossref", Some(FeedbackHeaders::crossref()));
    let crossref = CrossrefClient::new(Arc::clone(&api), server.uri());
    let enriched = crossref.enrich(&Reference::new("10.1021/np0497301")).await.unwrap();

    assert_eq!(enriched.title.as_deref(), Some("Ginkgolides from Ginkgo biloba"));
    assert_eq!(enriched.journal.as_deref(), Some("Journal of Natural Products"));
    assert_eq!(enriched.publication_date, chrono::NaiveDate::from_ymd_opt(2004, 6, 1));
    assert_eq!(api.limiter().current_delay().await, Duration::from_millis(20));
}

#[tokio::test]
async fn test_crossref_unknown_doi_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Resource not found."))
        .expect(1)
        .mount(&server)
        .await;

    let crossref = CrossrefClient::new(client("crossref", None), server.uri());
    assert!(crossref.work("10.9999/missing").await.unwrap().is_none());
}

// ============================================================================
// Wikibase
// ============================================================================

async fn mount_tokens(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("type", "login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": { "tokens": { "logintoken": "login+\\" } }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("type", "csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": { "tokens": { "csrftoken": "csrf+\\" } }
        })))
        .mount(server)
        .await;
}

fn publisher(server: &MockServer) -> WikibasePublisher {
    WikibasePublisher::new(client("wikibase", None), format!("{}/w/api.php", server.uri())).with_credentials(
        Credentials {
            username: "LotusBot".to_string(),
            password: "secret".to_string(),
        },
    )
}

#[tokio::test]
async fn test_wikibase_login_edit_logout() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=login"))
        .and(body_string_contains("lgname=LotusBot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": { "result": "Success", "lguserid": 7, "lgusername": "LotusBot" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=wbeditentity"))
        .and(body_string_contains("new=item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entity": { "id": "Q4242", "type": "item" }, "success": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = publisher(&server);
    publisher.connect().await.unwrap();
    let id = publisher
        .publish(&Document::new("Ginkgo biloba"), "LOTUS import")
        .await
        .unwrap();
    publisher.disconnect().await.unwrap();

    assert_eq!(id.as_str(), "Q4242");
}

#[tokio::test]
async fn test_wikibase_rejected_login_is_config_error() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": { "result": "Failed", "reason": "Incorrect username or password entered." }
        })))
        .mount(&server)
        .await;

    let err = publisher(&server).connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_wikibase_maxlag_is_a_rate_limit() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=wbeditentity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": "maxlag", "info": "Waiting for all: 5 seconds lagged" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = WikibasePublisher::new(client("wikibase", None), format!("{}/w/api.php", server.uri()));
    let err = publisher
        .publish(&Document::new("Ginkgo biloba"), "LOTUS import")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
}

#[tokio::test]
async fn test_wikibase_edit_is_sent_once_per_publish() {
    let server = MockServer::start().await;
    mount_tokens(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("action=wbeditentity"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = WikibasePublisher::new(client("wikibase", None), format!("{}/w/api.php", server.uri()));
    let err = publisher
        .publish(&Document::new("Ginkgo biloba"), "LOTUS import")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
