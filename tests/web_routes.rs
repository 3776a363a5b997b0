#![cfg(feature = "web")]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use dealer_price::app::{AppState, router};
use dealer_price::config::Settings;
use dealer_price::error::PriceError;
use dealer_price::login::hash_password;
use dealer_price::mailer::Notifier;
use dealer_price::store::{MemorySheetStore, SheetStore, Table};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const EMAIL: &str = "dealer@example.com";
const PASSWORD: &str = "secret-1";

/// Notifier that keeps every message instead of sending it.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn send(&self, to: &str, _subject: &str, body: &str) -> Result<(), PriceError> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), PriceError> {
        Err(PriceError::Mail("connection refused".to_string()))
    }
}

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn seeded_store() -> Arc<MemorySheetStore> {
    let prices = Table::new(
        strings(&["NO.", "規格", "牌價", "經銷價", "說明", "訂購品(V)"]),
        vec![
            strings(&["1", "FX5U-32MT", "15,000", "12,500", "PLC main unit", "V"]),
            strings(&["2", "SDC-20", "", "", "Servo drive", ""]),
            strings(&["3", " ", "100", "90", "blank spec row", ""]),
            strings(&["4", "MR-J4-10A", "8,000", "NT$6,400", "Amplifier", ""]),
        ],
    );
    let users = Table::new(
        strings(&["email", "password", "name"]),
        vec![vec![EMAIL.to_string(), hash_password(PASSWORD).unwrap(), "Dealer Wang".to_string()]],
    );
    Arc::new(
        MemorySheetStore::new()
            .with_table("prices", prices)
            .with_table("Users", users),
    )
}

fn app_with(store: Arc<MemorySheetStore>, notifier: Option<Arc<dyn Notifier>>) -> Router {
    let state = AppState::new(Settings::default(), store, notifier).unwrap();
    router(Arc::new(state))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn form(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Log in and return the `session=...` cookie pair, or None on failure.
async fn login(app: &Router, email: &str, password: &str) -> Option<String> {
    let response = send(app, form("/login", &[("email", email), ("password", password)], None)).await;
    if location(&response) != "/" {
        return None;
    }
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.to_string())
}

#[tokio::test]
async fn test_protected_routes_need_a_session() {
    let app = app_with(seeded_store(), None);

    let page = send(&app, get("/", None)).await;
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&page), "/login");

    let api = send(&app, get("/api/records", None)).await;
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);

    let bogus = send(&app, get("/api/records", Some("session=not-a-session"))).await;
    assert_eq!(bogus.status(), StatusCode::UNAUTHORIZED);
    println!("✓ Protected routes reject requests without a valid session");
}

#[tokio::test]
async fn test_login_outcomes() {
    let app = app_with(seeded_store(), None);

    assert!(login(&app, EMAIL, PASSWORD).await.is_some());
    assert!(login(&app, &format!("  {}  ", EMAIL), PASSWORD).await.is_some());

    let wrong = send(&app, form("/login", &[("email", EMAIL), ("password", "nope")], None)).await;
    assert!(location(&wrong).starts_with("/login?error="));
    assert!(location(&wrong).contains("Incorrect"));

    let unknown = send(&app, form("/login", &[("email", "who@example.com"), ("password", "x")], None)).await;
    assert!(location(&unknown).contains("not%20registered"));
    println!("✓ Login distinguishes success, wrong password and unknown email");
}

#[tokio::test]
async fn test_search_api_filters_and_formats() {
    let app = app_with(seeded_store(), None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let all = body_json(send(&app, get("/api/records", Some(&cookie))).await).await;
    assert_eq!(all["count"], 3);

    let hits = body_json(send(&app, get("/api/records?q=fx5u", Some(&cookie))).await).await;
    assert_eq!(hits["count"], 1);
    let rec = &hits["records"][0];
    assert_eq!(rec["spec"], "FX5U-32MT");
    assert_eq!(rec["row"], 0);
    assert_eq!(rec["dealer_price"], "12,500");
    assert_eq!(rec["list_price"], "15,000");
    assert_eq!(rec["order_only"], true);
    assert_eq!(rec["quotable"], true);

    let servo = body_json(send(&app, get("/api/records?q=SERVO", Some(&cookie))).await).await;
    assert_eq!(servo["records"][0]["dealer_price"], "Inquire");
    assert_eq!(servo["records"][0]["quotable"], false);
    println!("✓ Search API filters case-insensitively and formats prices");
}

#[tokio::test]
async fn test_quote_flow_through_api() {
    let app = app_with(seeded_store(), None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let edit_first = send(
        &app,
        post_json("/api/quote", serde_json::json!({"action": "edit_discount", "discount_percent": 90}), &cookie),
    )
    .await;
    assert_eq!(edit_first.status(), StatusCode::CONFLICT);

    let selected = body_json(
        send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 0, "spec": "FX5U-32MT"}), &cookie)).await,
    )
    .await;
    assert_eq!(selected["quote"]["discount_text"], "100.00");
    assert_eq!(selected["quote"]["sale_price"], 12500.0);

    let discounted = body_json(
        send(
            &app,
            post_json("/api/quote", serde_json::json!({"action": "edit_discount", "discount_percent": 90}), &cookie),
        )
        .await,
    )
    .await;
    assert_eq!(discounted["quote"]["sale_price"], 11250.0);
    assert_eq!(discounted["quote"]["sale_price_text"], "11,250");

    let priced = body_json(
        send(&app, post_json("/api/quote", serde_json::json!({"action": "edit_price", "sale_price": 11000}), &cookie)).await,
    )
    .await;
    assert_eq!(priced["quote"]["discount_text"], "88.00");

    // price-on-request records are refused and the quote survives
    let refused = send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 1, "spec": "SDC-20"}), &cookie)).await;
    assert_eq!(refused.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let missing = send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 0, "spec": "NOPE"}), &cookie)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let current = body_json(send(&app, get("/api/quote", Some(&cookie))).await).await;
    assert_eq!(current["quote"]["spec"], "FX5U-32MT");
    assert_eq!(current["quote"]["discount_text"], "88.00");

    let cleared = body_json(send(&app, post_json("/api/quote", serde_json::json!({"action": "deselect"}), &cookie)).await).await;
    assert!(cleared["quote"].is_null());
    println!("✓ Quote session follows select / edit / deselect");
}

#[tokio::test]
async fn test_repeated_spec_is_quoted_from_the_chosen_row() {
    let store = seeded_store();
    store
        .append_row(
            "prices",
            [("規格", "FX5U-32MT"), ("經銷價", "9,800"), ("說明", "second supplier")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap();
    let app = app_with(store, None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let hits = body_json(send(&app, get("/api/records?q=FX5U-32MT", Some(&cookie))).await).await;
    assert_eq!(hits["count"], 2);
    assert_eq!(hits["records"][1]["row"], 4);

    let first = body_json(
        send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 0, "spec": "FX5U-32MT"}), &cookie)).await,
    )
    .await;
    assert_eq!(first["quote"]["base_price"], 12500.0);
    send(
        &app,
        post_json("/api/quote", serde_json::json!({"action": "edit_discount", "discount_percent": 90}), &cookie),
    )
    .await;

    let second = body_json(
        send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 4, "spec": "FX5U-32MT"}), &cookie)).await,
    )
    .await;
    assert_eq!(second["quote"]["row"], 4);
    assert_eq!(second["quote"]["base_price"], 9800.0);
    assert_eq!(second["quote"]["discount_text"], "100.00");
    assert_eq!(second["quote"]["sale_price"], 9800.0);

    // a row index that no longer holds the named part is refused
    let stale = send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 3, "spec": "FX5U-32MT"}), &cookie)).await;
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);
    println!("✓ Each copy of a repeated part number quotes its own dealer price");
}

#[tokio::test]
async fn test_layout_links_encode_the_query() {
    let app = app_with(seeded_store(), None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let page = body_text(send(&app, get("/?q=a%26b%20%2Bc", Some(&cookie))).await).await;
    assert!(page.contains("/?q=a%26b%20%2Bc&layout=cards"));
    assert!(page.contains("/?q=a%26b%20%2Bc&layout=table"));
}

#[tokio::test]
async fn test_quotes_are_per_session() {
    let app = app_with(seeded_store(), None);
    let first = login(&app, EMAIL, PASSWORD).await.unwrap();
    let second = login(&app, EMAIL, PASSWORD).await.unwrap();

    send(&app, post_json("/api/quote", serde_json::json!({"action": "select", "row": 3, "spec": "MR-J4-10A"}), &first)).await;

    let mine = body_json(send(&app, get("/api/quote", Some(&first))).await).await;
    let theirs = body_json(send(&app, get("/api/quote", Some(&second))).await).await;
    assert_eq!(mine["quote"]["base_price"], 6400.0);
    assert!(theirs["quote"].is_null());
}

#[tokio::test]
async fn test_search_page_layouts() {
    let app = app_with(seeded_store(), None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let table = body_text(send(&app, get("/?q=fx5u", Some(&cookie))).await).await;
    assert!(table.contains("Dealer Wang"));
    assert!(table.contains("12,500"));
    assert!(table.contains("<table>"));
    assert!(table.contains("Results: 1"));

    let cards = body_text(send(&app, get("/?q=servo&layout=cards", Some(&cookie))).await).await;
    assert!(cards.contains("class=\"cards\""));
    assert!(cards.contains("Inquire"));

    let none = body_text(send(&app, get("/?q=zzz", Some(&cookie))).await).await;
    assert!(none.contains("No matching records."));
    println!("✓ Table and card layouts render the same search");
}

#[tokio::test]
async fn test_missing_price_table_shows_error() {
    let store = Arc::new(MemorySheetStore::new().with_table(
        "Users",
        Table::new(
            strings(&["email", "password", "name"]),
            vec![vec![EMAIL.to_string(), hash_password(PASSWORD).unwrap(), String::new()]],
        ),
    ));
    let app = app_with(store, None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let page = body_text(send(&app, get("/", Some(&cookie))).await).await;
    assert!(page.contains("Cannot read the price database"));
    // blank name falls back to the email
    assert!(page.contains(EMAIL));

    let api = send(&app, get("/api/records", Some(&cookie))).await;
    assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_forgot_password_mails_new_password() {
    let store = seeded_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let app = app_with(store.clone(), Some(notifier.clone()));

    let unknown = send(&app, form("/forgot-password", &[("email", "who@example.com")], None)).await;
    assert!(location(&unknown).starts_with("/forgot-password?error="));
    assert!(notifier.sent.lock().unwrap().is_empty());

    let response = send(&app, form("/forgot-password", &[("email", EMAIL)], None)).await;
    assert!(location(&response).starts_with("/login?success="));

    let (to, body) = notifier.sent.lock().unwrap()[0].clone();
    assert_eq!(to, EMAIL);
    let new_password = body
        .lines()
        .find_map(|line| line.strip_prefix("New password: "))
        .unwrap()
        .trim()
        .to_string();
    assert_eq!(new_password.len(), 8);

    assert!(login(&app, EMAIL, PASSWORD).await.is_none());
    assert!(login(&app, EMAIL, &new_password).await.is_some());
    println!("✓ Reset mails a new password and replaces the stored hash");
}

#[tokio::test]
async fn test_failed_mail_keeps_old_password() {
    let store = seeded_store();
    let before = store.all_rows("Users").unwrap()[0]["password"].clone();
    let app = app_with(store.clone(), Some(Arc::new(FailingNotifier)));

    let response = send(&app, form("/forgot-password", &[("email", EMAIL)], None)).await;
    assert!(location(&response).starts_with("/forgot-password?error="));
    assert_eq!(store.all_rows("Users").unwrap()[0]["password"], before);
    assert!(login(&app, EMAIL, PASSWORD).await.is_some());
}

#[tokio::test]
async fn test_forgot_password_without_mailer() {
    let app = app_with(seeded_store(), None);
    let response = send(&app, form("/forgot-password", &[("email", EMAIL)], None)).await;
    assert!(location(&response).contains("mail%20sender"));
}

#[tokio::test]
async fn test_change_password_and_logout() {
    let app = app_with(seeded_store(), None);
    let cookie = login(&app, EMAIL, PASSWORD).await.unwrap();

    let empty = send(&app, form("/change-password", &[("new_password", "")], Some(&cookie))).await;
    assert!(location(&empty).starts_with("/?error="));

    let changed = send(&app, form("/change-password", &[("new_password", "fresh-pass")], Some(&cookie))).await;
    assert!(location(&changed).starts_with("/?notice="));
    assert!(login(&app, EMAIL, PASSWORD).await.is_none());
    assert!(login(&app, EMAIL, "fresh-pass").await.is_some());

    let out = send(&app, form("/logout", &[], Some(&cookie))).await;
    assert_eq!(location(&out), "/login");
    let after = send(&app, get("/api/records", Some(&cookie))).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    println!("✓ Password change and logout work for the signed-in user");
}
