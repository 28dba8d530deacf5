use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::task::JoinSet;

use crate::helpers::TestApp;

async fn stored_rows(app: &TestApp) -> Result<Vec<(String, Option<String>, DateTime<Utc>)>> {
    let rows = sqlx::query_as(
        "SELECT email, source, created_at FROM email_signups ORDER BY email",
    )
    .fetch_all(app.dm.db())
    .await?;
    Ok(rows)
}

#[tokio::test]
async fn signup_ok() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_emails(&json!({ "email": "a@x.com", "source": "gamers" }))
        .await?;

    assert_eq!(
        res.status(),
        StatusCode::CREATED,
        "Wrong response StatusCode: {}",
        res.status()
    );
    assert_eq!(res.json::<Value>().await?, json!({ "success": true }));

    let rows = stored_rows(&app).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "a@x.com");
    assert_eq!(rows[0].1.as_deref(), Some("gamers"));

    Ok(())
}

#[tokio::test]
async fn signup_without_source_stores_null() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app.post_emails(&json!({ "email": "drone@hive.io" })).await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let rows = stored_rows(&app).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, None);

    Ok(())
}

#[tokio::test]
async fn signup_null_source_is_a_400() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_emails(&json!({ "email": "a@x.com", "source": null }))
        .await?;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["details"][0]["path"], json!(["source"]));
    assert_eq!(body["details"][0]["code"], "invalid_type");
    assert!(stored_rows(&app).await?.is_empty(), "a row was created");

    Ok(())
}

#[tokio::test]
async fn signup_distinct_emails_produce_distinct_rows() -> Result<()> {
    let app = TestApp::spawn().await?;

    for email in ["first@hive.io", "second@hive.io", "First@hive.io"] {
        let res = app.post_emails(&json!({ "email": email })).await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    // Emails are case sensitive
    let rows = stored_rows(&app).await?;
    let emails: Vec<_> = rows.iter().map(|(email, _, _)| email.as_str()).collect();
    assert_eq!(emails, ["First@hive.io", "first@hive.io", "second@hive.io"]);

    Ok(())
}

#[tokio::test]
async fn signup_resubmission_overwrites_source_and_refreshes_created_at() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_emails(&json!({ "email": "a@x.com", "source": "gamers" }))
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let first_created_at = stored_rows(&app).await?[0].2;

    tokio::time::sleep(Duration::from_millis(20)).await;

    let res = app
        .post_emails(&json!({ "email": "a@x.com", "source": "studios" }))
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let rows = stored_rows(&app).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.as_deref(), Some("studios"));
    assert!(
        rows[0].2 > first_created_at,
        "created_at was not refreshed: {} <= {first_created_at}",
        rows[0].2
    );

    Ok(())
}

#[tokio::test]
async fn signup_concurrent_resubmissions_leave_a_single_row() -> Result<()> {
    let app = TestApp::spawn().await?;
    let sources = ["gamers", "investors", "studios", "press", "fans"];

    let mut requests = JoinSet::new();
    for source in sources {
        let req = app
            .http_client
            .post(app.url("/emails"))
            .json(&json!({ "email": "swarm@hive.io", "source": source }));
        requests.spawn(req.send());
    }
    while let Some(res) = requests.join_next().await {
        assert_eq!(res??.status(), StatusCode::CREATED);
    }

    let rows = stored_rows(&app).await?;
    assert_eq!(rows.len(), 1);
    let source = rows[0].1.as_deref().unwrap_or_default();
    assert!(sources.contains(&source), "unexpected source: {source}");

    Ok(())
}

#[tokio::test]
async fn signup_returns_a_400_when_payload_is_invalid() -> Result<()> {
    let app = TestApp::spawn().await?;

    let cases = [
        (json!({ "email": "not-an-email" }), "Invalid email"),
        (json!({ "email": "" }), "Empty email"),
        (json!({ "source": "gamers" }), "Missing email"),
        (json!({ "email": 42 }), "Email not a string"),
        (json!({ "email": "a@x.com", "source": 7 }), "Source not a string"),
        (json!({ "email": "a@localhost" }), "Dotless domain"),
        (json!({}), "Empty json"),
        (json!(["a@x.com"]), "Not an object"),
    ];

    for (body, description) in cases {
        let res = app.post_emails(&body).await?;
        assert_eq!(
            400,
            res.status().as_u16(),
            "The API did not return a 400 BAD REQUEST the payload was {}.",
            description
        );
        let body: Value = res.json().await?;
        assert_eq!(body["error"], "Invalid payload", "{description}");
        assert!(
            body["details"].as_array().is_some_and(|d| !d.is_empty()),
            "no details for {description}"
        );
    }

    assert!(stored_rows(&app).await?.is_empty(), "a row was created");

    Ok(())
}

#[tokio::test]
async fn signup_invalid_email_details_point_at_the_field() -> Result<()> {
    let app = TestApp::spawn_without_db().await?;

    let res = app.post_emails(&json!({ "email": "not-an-email" })).await?;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>().await?,
        json!({
            "error": "Invalid payload",
            "details": [{
                "path": ["email"],
                "code": "invalid_string",
                "message": "Invalid email",
            }]
        })
    );

    Ok(())
}

#[tokio::test]
async fn signup_malformed_json_is_a_400() -> Result<()> {
    let app = TestApp::spawn_without_db().await?;

    let malformed = app
        .http_client
        .post(app.url("/emails"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{ "email": "#)
        .send()
        .await?;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await?;
    assert_eq!(body["details"][0]["code"], "invalid_json");

    let not_json = app
        .http_client
        .post(app.url("/emails"))
        .body("email=a@x.com")
        .send()
        .await?;
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn signup_storage_failure_is_an_opaque_500() -> Result<()> {
    // Nothing listens on port 1, every connection attempt fails.
    let app = TestApp::spawn_without_db_with(|config| config.db_config.port = 1).await?;

    let res = app.post_emails(&json!({ "email": "a@x.com" })).await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.json::<Value>().await?,
        json!({ "error": "Internal server error" })
    );

    Ok(())
}

#[tokio::test]
async fn signup_is_rate_limited_per_caller() -> Result<()> {
    let app = TestApp::spawn_without_db_with(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.max_requests = 2;
        config.rate_limit.window_secs = 60;
    })
    .await?;

    // Invalid payloads still count but never reach storage.
    let body = json!({ "email": "not-an-email" });
    for _ in 0..2 {
        let res = app.post_emails(&body).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    let res = app.post_emails(&body).await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()[header::RETRY_AFTER].to_str()?.parse()?;
    assert!((1..=60).contains(&retry_after));
    assert_eq!(
        res.json::<Value>().await?,
        json!({ "error": "Too many requests" })
    );

    // The health check is not rate limited
    let res = app.http_client.get(app.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn signup_secret_guard_rejects_requests_without_the_secret() -> Result<()> {
    let app = TestApp::spawn_without_db_with(|config| {
        config.security.signup_secret = Some(SecretString::from("royal-jelly".to_string()));
    })
    .await?;
    let body = json!({ "email": "not-an-email" });

    let missing = app.post_emails(&body).await?;
    assert_eq!(missing.status(), StatusCode::TOO_MANY_REQUESTS);

    let wrong = app.post_emails_with_secret(&body, "honey").await?;
    assert_eq!(wrong.status(), StatusCode::TOO_MANY_REQUESTS);

    // Past the guard, the payload is validated as usual
    let right = app.post_emails_with_secret(&body, "royal-jelly").await?;
    assert_eq!(right.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn signup_oversized_body_is_a_413() -> Result<()> {
    let app = TestApp::spawn_without_db().await?;
    let body = json!({ "email": "a@x.com", "source": "x".repeat(20 * 1024) });

    let res = app.post_emails(&body).await?;

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        res.json::<Value>().await?,
        json!({ "error": "Payload too large" })
    );

    Ok(())
}
