//! API integration tests
//!
//! Run against a live server whose bootstrap admin matches `ADMIN_EMAIL` /
//! `ADMIN_PASSWORD` (defaults below):
//! `cargo test --test api_tests -- --ignored`

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.org".to_string()),
        std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin-password".to_string()),
    )
}

async fn login(client: &Client, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    assert!(response.status().is_success(), "login failed for {}", email);
    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn admin_token(client: &Client) -> String {
    let (email, password) = admin_credentials();
    login(client, &email, &password).await
}

/// Register a throwaway reader and return its token
async fn reader_token(client: &Client) -> String {
    reader_account(client).await.0
}

/// Register a throwaway reader and return its token and user ID
async fn reader_account(client: &Client) -> (String, String) {
    let email = format!("reader-{}@example.org", uuid::Uuid::new_v4());
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({ "email": email, "password": "reader-pass", "name": "Test Reader" }))
        .send()
        .await
        .expect("Failed to send register request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse register response");
    assert_eq!(body["user"]["role"], "user");
    (
        body["token"].as_str().expect("No token in response").to_string(),
        body["user"]["id"].as_str().expect("No user ID").to_string(),
    )
}

async fn create_book(client: &Client, admin: &str, quantity: i64) -> String {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({
            "title": "Integration Test Book",
            "author": "Test Author",
            "isbn": "978-0-00-000000-0",
            "quantity": quantity
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["available_quantity"], quantity);
    body["id"].as_str().expect("No book ID").to_string()
}

async fn get_book(client: &Client, token: &str, id: &str) -> Value {
    client
        .get(format!("{}/books/{}", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response")
}

async fn borrow(client: &Client, token: &str, id: &str) -> StatusCode {
    client
        .post(format!("{}/books/{}/borrow", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .status()
}

/// Borrow and report the status with the `error` name of a failure body
async fn borrow_code(client: &Client, token: &str, id: &str) -> (StatusCode, String) {
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body: Value = response.json().await.expect("Failed to parse response");
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

async fn give_back(client: &Client, token: &str, id: &str) -> StatusCode {
    client
        .post(format!("{}/books/{}/return", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .status()
}

async fn delete_book(client: &Client, admin: &str, id: &str) {
    let _ = client
        .delete(format!("{}/books/{}", BASE_URL, id))
        .bearer_auth(admin)
        .send()
        .await;
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (email, _) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_me_returns_admin() {
    let client = Client::new();
    let token = admin_token(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "admin");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_reader_cannot_add_books() {
    let client = Client::new();
    let token = reader_token(&client).await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "title": "T", "author": "A", "isbn": "1" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_cycle() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    assert_eq!(borrow(&client, &reader, &book_id).await, StatusCode::CREATED);
    let book = get_book(&client, &reader, &book_id).await;
    assert_eq!(book["available_quantity"], 0);
    assert_eq!(book["available"], false);

    // Same reader cannot take it twice, and nobody else can take the last copy
    let (status, code) = borrow_code(&client, &reader, &book_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code, "Duplicate");
    let other = reader_token(&client).await;
    let (status, code) = borrow_code(&client, &other, &book_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code, "BookNotAvailable");

    let mine: Value = client
        .get(format!("{}/me/borrows", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
    assert_eq!(mine[0]["status"], "active");
    assert_eq!(mine[0]["days_remaining"], 7);
    assert_eq!(mine[0]["book"]["id"], book_id.as_str());

    assert_eq!(give_back(&client, &reader, &book_id).await, StatusCode::OK);
    assert_eq!(give_back(&client, &reader, &book_id).await, StatusCode::NOT_FOUND);
    assert_eq!(give_back(&client, &other, &book_id).await, StatusCode::NOT_FOUND);

    let book = get_book(&client, &reader, &book_id).await;
    assert_eq!(book["available_quantity"], 1);

    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_quantity_cannot_drop_below_borrowed() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 2).await;

    assert_eq!(borrow(&client, &reader, &book_id).await, StatusCode::CREATED);

    let response = client
        .put(format!("{}/books/{}/quantity", BASE_URL, book_id))
        .bearer_auth(&admin)
        .json(&json!({ "quantity": 0 }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .put(format!("{}/books/{}/quantity", BASE_URL, book_id))
        .bearer_auth(&admin)
        .json(&json!({ "quantity": 5 }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["quantity"], 5);
    assert_eq!(body["available_quantity"], 4);

    // Deleting is refused while a copy is out
    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(give_back(&client, &reader, &book_id).await, StatusCode::OK);
    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_never_oversubscribe() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let book_id = create_book(&client, &admin, 3).await;

    let mut readers = Vec::new();
    for _ in 0..10 {
        readers.push(reader_token(&client).await);
    }

    let attempts = readers.iter().map(|token| {
        let client = client.clone();
        let token = token.clone();
        let book_id = book_id.clone();
        tokio::spawn(async move { borrow(&client, &token, &book_id).await })
    });

    let mut created = 0;
    for handle in attempts.collect::<Vec<_>>() {
        match handle.await.expect("task panicked") {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::CONFLICT),
        }
    }

    let book = get_book(&client, &admin, &book_id).await;
    let available = book["available_quantity"].as_i64().expect("available_quantity");
    assert!(created <= 3);
    assert_eq!(available, 3 - created);

    for token in &readers {
        let _ = give_back(&client, token, &book_id).await;
    }
    let book = get_book(&client, &admin, &book_id).await;
    assert_eq!(book["available_quantity"], 3);

    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_admin_history_and_stats() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    assert_eq!(borrow(&client, &reader, &book_id).await, StatusCode::CREATED);

    let history: Value = client
        .get(format!("{}/borrows?status=active", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    let entry = history
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["book_id"] == book_id.as_str()))
        .expect("borrow missing from history");
    assert_eq!(entry["status"], "active");
    assert_eq!(entry["user"]["name"], "Test Reader");

    let stats: Value = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert!(stats["active_borrows"].as_i64().unwrap_or(0) >= 1);

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(give_back(&client, &reader, &book_id).await, StatusCode::OK);
    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_admin_return_twice_conflicts() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    let record_id = body["record"]["id"].as_str().expect("No record ID").to_string();

    let close = |token: String| {
        let client = client.clone();
        let url = format!("{}/borrows/{}/return", BASE_URL, record_id);
        async move {
            client
                .post(url)
                .bearer_auth(token)
                .send()
                .await
                .expect("Failed to send request")
                .status()
        }
    };

    assert_eq!(close(reader.clone()).await, StatusCode::FORBIDDEN);
    assert_eq!(close(admin.clone()).await, StatusCode::OK);
    assert_eq!(close(admin.clone()).await, StatusCode::CONFLICT);

    let book = get_book(&client, &admin, &book_id).await;
    assert_eq!(book["available_quantity"], 1);

    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_overdue_listing_excludes_fresh_borrows() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    assert_eq!(borrow(&client, &reader, &book_id).await, StatusCode::CREATED);

    for path in ["/borrows/overdue", "/borrows?status=overdue"] {
        let rows: Value = client
            .get(format!("{}{}", BASE_URL, path))
            .bearer_auth(&admin)
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse response");
        let rows = rows.as_array().expect("list response");
        assert!(rows.iter().all(|r| r["status"] == "overdue"), "{}", path);
        assert!(rows.iter().all(|r| r["book_id"] != book_id.as_str()), "{}", path);
    }

    assert_eq!(give_back(&client, &reader, &book_id).await, StatusCode::OK);
    delete_book(&client, &admin, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_role_round_trip() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (reader, reader_id) = reader_account(&client).await;

    let set_role = |id: String, role: &'static str| {
        let client = client.clone();
        let admin = admin.clone();
        async move {
            client
                .put(format!("{}/users/{}/role", BASE_URL, id))
                .bearer_auth(admin)
                .json(&json!({ "role": role }))
                .send()
                .await
                .expect("Failed to send request")
        }
    };

    let response = set_role(reader_id.clone(), "admin").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "admin");

    // Role lives in the token, so the old reader token still cannot list users
    let response = client
        .get(format!("{}/users", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = set_role(reader_id.clone(), "user").await;
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "user");

    let response = set_role(uuid::Uuid::new_v4().to_string(), "admin").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_return_racing_reborrow_never_fails_server_side() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let reader = reader_token(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    for _ in 0..20 {
        let _ = borrow(&client, &reader, &book_id).await;

        let returning = {
            let (client, reader, book_id) = (client.clone(), reader.clone(), book_id.clone());
            tokio::spawn(async move { give_back(&client, &reader, &book_id).await })
        };
        let borrowing = {
            let (client, reader, book_id) = (client.clone(), reader.clone(), book_id.clone());
            tokio::spawn(async move { borrow(&client, &reader, &book_id).await })
        };

        let returned = returning.await.expect("task panicked");
        let borrowed = borrowing.await.expect("task panicked");
        assert!(!returned.is_server_error(), "return failed with {}", returned);
        assert!(!borrowed.is_server_error(), "borrow failed with {}", borrowed);
    }

    let _ = give_back(&client, &reader, &book_id).await;
    let book = get_book(&client, &admin, &book_id).await;
    assert_eq!(book["available_quantity"], 1);

    delete_book(&client, &admin, &book_id).await;
}
