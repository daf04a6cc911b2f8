//! HTTP API integration tests: the router is served on an ephemeral port over the seeded
//! in-memory store and driven with reqwest.

use std::sync::Arc;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use advisorhub::config::{AppConfig, Environment};
use advisorhub::contacts::ContactFilter;
use advisorhub::identity::{IdentityProvider, LocalIdentityProvider};
use advisorhub::model::Page;
use advisorhub::seed::{self, INVESTMENT_SOLUTIONS, WEALTH_MANAGEMENT_PARTNERS};
use advisorhub::server::{router, AppState, CSRF_HEADER};
use advisorhub::store::{Actor, MemoryStore, Store};

struct Server {
    base: String,
    store: Arc<MemoryStore>,
    identity: Arc<LocalIdentityProvider>,
}

async fn spawn(environment: Environment) -> Result<Server> {
    let store = Arc::new(MemoryStore::new());
    seed::seed_demo_data(store.as_ref()).await?;
    let identity = Arc::new(LocalIdentityProvider::new());
    let config = AppConfig { environment, ..AppConfig::default() };
    let state = AppState::new(store.clone(), identity.clone(), &config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    Ok(Server { base: format!("http://{}", addr), store, identity })
}

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().cookie_store(true).build()?)
}

/// Log in and return the CSRF token for the new session.
async fn login(c: &reqwest::Client, base: &str, email: &str, password: &str) -> Result<String> {
    let resp = c.post(format!("{base}/login")).json(&json!({"email": email, "password": password})).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    Ok(body["csrf"].as_str().unwrap_or_default().to_string())
}

async fn test_advisor_session(srv: &Server) -> Result<(reqwest::Client, String)> {
    let c = client()?;
    let resp = c.post(format!("{}/admin/test-advisor", srv.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let csrf = login(&c, &srv.base, "test@example.com", "password123").await?;
    Ok((c, csrf))
}

#[tokio::test]
async fn health_and_unauthenticated_requests() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let c = client()?;
    let ok = c.get(format!("{}/", srv.base)).send().await?;
    assert_eq!(ok.status(), StatusCode::OK);

    let resp = c.get(format!("{}/contacts", srv.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await?;
    assert_eq!(body["redirect"], "/auth/login");

    let bad = c.post(format!("{}/login", srv.base)).json(&json!({"email": "x@y.test", "password": "nope"})).send().await?;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn signed_in_identity_without_advisor_is_not_registered() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    srv.identity.create_or_reuse("lonely@x.test", "pw12345").await?;
    let c = client()?;
    login(&c, &srv.base, "lonely@x.test", "pw12345").await?;

    for path in ["/me", "/contacts", "/advisors"] {
        let resp = c.get(format!("{}{}", srv.base, path)).send().await?;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
        let body: Value = resp.json().await?;
        assert_eq!(body["code"], "not_registered");
        assert_eq!(body["remediation"], "/create-advisor");
    }
    Ok(())
}

#[tokio::test]
async fn contacts_are_firm_scoped_filtered_and_paged() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, _) = test_advisor_session(&srv).await?;

    let me: Value = c.get(format!("{}/me", srv.base)).send().await?.json().await?;
    assert_eq!(me["advisor"]["firm"]["id"], WEALTH_MANAGEMENT_PARTNERS.to_string());

    let all: Value = c.get(format!("{}/contacts", srv.base)).send().await?.json().await?;
    assert_eq!(all["total"], 15);
    assert_eq!(all["contacts"].as_array().map(Vec::len), Some(15));
    assert!(all["contacts"]
        .as_array()
        .into_iter()
        .flatten()
        .all(|c| c["firmId"] == WEALTH_MANAGEMENT_PARTNERS.to_string()));

    let smith: Value = c.get(format!("{}/contacts?q=smith", srv.base)).send().await?.json().await?;
    assert_eq!(smith["contacts"][0]["lastName"], "Smith");
    assert_eq!(smith["contacts"].as_array().map(Vec::len), Some(1));

    let former: Value = c.get(format!("{}/contacts?status=former", srv.base)).send().await?.json().await?;
    assert_eq!(former["contacts"].as_array().map(Vec::len), Some(1));

    let paged: Value = c.get(format!("{}/contacts?limit=4&offset=2", srv.base)).send().await?.json().await?;
    assert_eq!(paged["contacts"].as_array().map(Vec::len), Some(4));
    assert_eq!(paged["total"], 15);
    assert_eq!(paged["limit"], 4);

    assert_eq!(paged["matched"], 15);

    let bad = c.get(format!("{}/contacts?status=vip", srv.base)).send().await?;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn search_finds_matches_beyond_the_first_page() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, csrf) = test_advisor_session(&srv).await?;
    for (first, last) in [("Zelda", "Needle"), ("Newer", "One"), ("Newer", "Two"), ("Newer", "Three")] {
        let resp = c
            .post(format!("{}/contacts", srv.base))
            .header(CSRF_HEADER, &csrf)
            .json(&json!({"firstName": first, "lastName": last}))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let body: Value = c.get(format!("{}/contacts?q=needle&limit=2", srv.base)).send().await?.json().await?;
    assert_eq!(body["contacts"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["contacts"][0]["lastName"], "Needle");
    assert_eq!(body["matched"], 1);
    assert_eq!(body["total"], 19);
    Ok(())
}

#[tokio::test]
async fn writes_require_csrf_and_ignore_forged_firm() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, csrf) = test_advisor_session(&srv).await?;
    let payload = json!({"firmId": INVESTMENT_SOLUTIONS, "firstName": "X", "lastName": "Y"});

    let no_csrf = c.post(format!("{}/contacts", srv.base)).json(&payload).send().await?;
    assert_eq!(no_csrf.status(), StatusCode::FORBIDDEN);

    let created = c.post(format!("{}/contacts", srv.base)).header(CSRF_HEADER, &csrf).json(&payload).send().await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await?;
    assert_eq!(body["contact"]["firmId"], WEALTH_MANAGEMENT_PARTNERS.to_string());
    assert_eq!(body["contact"]["status"], "prospect");
    let id = body["contact"]["id"].as_str().unwrap_or_default().to_string();

    let patched = c
        .patch(format!("{}/contacts/{}", srv.base, id))
        .header(CSRF_HEADER, &csrf)
        .json(&json!({"status": "active", "phone": "555-9999"}))
        .send()
        .await?;
    assert_eq!(patched.status(), StatusCode::OK);
    let body: Value = patched.json().await?;
    assert_eq!(body["contact"]["status"], "active");

    let invalid = c
        .post(format!("{}/contacts", srv.base))
        .header(CSRF_HEADER, &csrf)
        .json(&json!({"firstName": " "}))
        .send()
        .await?;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await?;
    assert_eq!(body["fields"].as_array().map(Vec::len), Some(2));

    let deleted = c.delete(format!("{}/contacts/{}", srv.base, id)).header(CSRF_HEADER, &csrf).send().await?;
    assert_eq!(deleted.status(), StatusCode::OK);
    let gone = c.get(format!("{}/contacts/{}", srv.base, id)).send().await?;
    assert_eq!(gone.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn foreign_contact_looks_exactly_like_unknown_contact() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, csrf) = test_advisor_session(&srv).await?;
    let theirs = srv
        .store
        .list_contacts(Actor::Service, INVESTMENT_SOLUTIONS, &ContactFilter::default(), Page::default())
        .await?;
    let foreign_id = theirs.contacts[0].id;

    let foreign = c.get(format!("{}/contacts/{}", srv.base, foreign_id)).send().await?;
    let foreign_status = foreign.status();
    let foreign_body: Value = foreign.json().await?;
    let unknown = c.get(format!("{}/contacts/{}", srv.base, uuid::Uuid::new_v4())).send().await?;
    let unknown_status = unknown.status();
    let unknown_body: Value = unknown.json().await?;
    assert_eq!(foreign_status, StatusCode::FORBIDDEN);
    assert_eq!(foreign_status, unknown_status);
    assert_eq!(foreign_body, unknown_body);

    let del = c.delete(format!("{}/contacts/{}", srv.base, foreign_id)).header(CSRF_HEADER, &csrf).send().await?;
    assert_eq!(del.status(), StatusCode::FORBIDDEN);
    assert!(srv.store.contact(Actor::Service, foreign_id).await?.is_some());

    let firm = c.get(format!("{}/firms/{}", srv.base, INVESTMENT_SOLUTIONS)).send().await?;
    assert_eq!(firm.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, csrf) = test_advisor_session(&srv).await?;
    let csrf_again: Value = c.get(format!("{}/csrf", srv.base)).send().await?.json().await?;
    assert_eq!(csrf_again["csrf"], csrf.as_str());

    let refused = c.post(format!("{}/logout", srv.base)).send().await?;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);
    let out = c.post(format!("{}/logout", srv.base)).header(CSRF_HEADER, &csrf).send().await?;
    assert_eq!(out.status(), StatusCode::OK);
    let after = c.get(format!("{}/me", srv.base)).send().await?;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn advisor_profile_endpoints() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let (c, csrf) = test_advisor_session(&srv).await?;
    let me: Value = c.get(format!("{}/me", srv.base)).send().await?.json().await?;
    let my_id = me["advisor"]["id"].as_str().unwrap_or_default().to_string();

    let list: Value = c.get(format!("{}/advisors", srv.base)).send().await?.json().await?;
    assert_eq!(list["advisors"].as_array().map(Vec::len), Some(1));

    let patched = c
        .patch(format!("{}/advisors/{}", srv.base, my_id))
        .header(CSRF_HEADER, &csrf)
        .json(&json!({"firstName": "Tess"}))
        .send()
        .await?;
    assert_eq!(patched.status(), StatusCode::OK);
    let body: Value = patched.json().await?;
    assert_eq!(body["advisor"]["firstName"], "Tess");
    assert_eq!(body["advisor"]["role"], "advisor");
    Ok(())
}

#[tokio::test]
async fn moving_an_advisor_ends_their_sessions() -> Result<()> {
    let srv = spawn(Environment::Local).await?;
    let admin = client()?;
    let provision = |firm: uuid::Uuid| {
        json!({
            "email": "mover@x.test",
            "firstName": "Mo",
            "lastName": "Ver",
            "password": "pw12345",
            "firmId": firm,
        })
    };
    let first = admin.post(format!("{}/admin/advisors", srv.base)).json(&provision(INVESTMENT_SOLUTIONS)).send().await?;
    assert_eq!(first.status(), StatusCode::OK);

    let c = client()?;
    login(&c, &srv.base, "mover@x.test", "pw12345").await?;
    assert_eq!(c.get(format!("{}/me", srv.base)).send().await?.status(), StatusCode::OK);

    let same = admin.post(format!("{}/admin/advisors", srv.base)).json(&provision(INVESTMENT_SOLUTIONS)).send().await?;
    let body: Value = same.json().await?;
    assert!(body["provisioned"].get("movedFromFirm").is_none());
    assert_eq!(c.get(format!("{}/me", srv.base)).send().await?.status(), StatusCode::OK);

    let moved = admin.post(format!("{}/admin/advisors", srv.base)).json(&provision(WEALTH_MANAGEMENT_PARTNERS)).send().await?;
    let body: Value = moved.json().await?;
    assert_eq!(body["provisioned"]["movedFromFirm"], INVESTMENT_SOLUTIONS.to_string());
    assert_eq!(c.get(format!("{}/me", srv.base)).send().await?.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn provisioning_is_refused_in_production() -> Result<()> {
    let srv = spawn(Environment::Production).await?;
    let c = client()?;
    let resp = c.post(format!("{}/admin/test-advisor", srv.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await?;
    assert_eq!(body["code"], "provisioning_disabled");

    let resp = c
        .post(format!("{}/admin/advisors", srv.base))
        .json(&json!({
            "email": "p@x.test",
            "firstName": "P",
            "lastName": "Q",
            "password": "pw",
            "firmId": WEALTH_MANAGEMENT_PARTNERS,
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    Ok(())
}
