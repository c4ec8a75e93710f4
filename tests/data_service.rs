use std::sync::Arc;

use broke_buster::budget::BudgetContext;
use broke_buster::database::models::{NewExpense, ProfileUpdate};
use broke_buster::database::{connect, DataService, HostedConfig, StoreError};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn service(server: &MockServer) -> DataService {
    let conn = connect(&HostedConfig {
        project_url: Url::parse(&server.uri()).unwrap(),
        anon_key: "anon".into(),
    })
    .unwrap();
    DataService::new(conn)
}

fn expense_row(id: &str, amount: f64, category: &str, date: &str) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": "u1",
        "amount": amount,
        "category": category,
        "description": format!("{category} expense"),
        "date": date,
        "note": null,
        "receipt_url": null,
        "created_at": "2024-12-05T10:00:00+00:00"
    })
}

fn table_missing(table: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "code": "PGRST205",
        "details": null,
        "hint": null,
        "message": format!("Could not find the table 'public.{table}' in the schema cache")
    }))
}

#[tokio::test]
async fn lists_expenses_for_user_newest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .and(query_param("user_id", "eq.u1"))
        .and(query_param("order", "date.desc"))
        .and(query_param("limit", "50"))
        .and(header("apikey", "anon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            expense_row("e2", 120.5, "Transportation", "2024-12-06"),
            expense_row("e1", 456.0, "Food & Dining", "2024-12-05"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = service(&server).await.list_expenses(Some("u1")).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "e2");
    assert_eq!(rows[0].amount, Decimal::new(1205, 1));
    assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 12, 5).unwrap());
}

#[tokio::test]
async fn missing_expenses_table_serves_two_sample_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .respond_with(table_missing("expenses"))
        .mount(&server)
        .await;

    let rows = service(&server).await.list_expenses(None).await.unwrap();

    let today = Utc::now().date_naive();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, today);
    assert_eq!(rows[1].date, today - Duration::days(1));
}

#[tokio::test]
async fn missing_budgets_table_serves_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/budgets"))
        .respond_with(table_missing("budgets"))
        .mount(&server)
        .await;

    let budgets = service(&server).await.list_budgets(None).await.unwrap();

    let total: Decimal = budgets.iter().map(|b| b.monthly_limit).sum();
    assert_eq!(budgets.len(), 5);
    assert_eq!(total, Decimal::from(27000));
}

#[tokio::test]
async fn other_store_errors_are_returned_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "42703",
            "message": "column expenses.colour does not exist"
        })))
        .mount(&server)
        .await;

    let err = service(&server).await.list_expenses(None).await.unwrap_err();

    assert!(matches!(err, StoreError::Api { status: 400, .. }));
    assert_eq!(err.to_string(), "column expenses.colour does not exist");
}

#[tokio::test]
async fn added_expense_lands_first_in_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            expense_row("e1", 80.0, "Transportation", "2024-12-04"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/budgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/expenses"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {
                "id": "9f3c2a4e-0000-4000-8000-000000000001",
                "user_id": "u1",
                "amount": 456,
                "category": "Food & Dining",
                "description": "Grocery Store",
                "date": "2024-12-05",
                "created_at": "2024-12-05T12:30:00.123456+00:00"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let data = Arc::new(service(&server).await);
    let ctx = BudgetContext::new(data);
    ctx.set_user(Some("u1".into()));
    ctx.load().await;

    let draft = NewExpense::new(
        Decimal::from(456),
        "Food & Dining",
        "Grocery Store",
        NaiveDate::from_ymd_opt(2024, 12, 5).unwrap(),
    );
    let row = ctx.add_expense(draft).await.unwrap();

    assert!(!row.id.is_empty());
    let snapshot = ctx.snapshot();
    assert_eq!(snapshot.expenses.len(), 2);
    assert_eq!(snapshot.expenses[0].id, row.id);

    let requests = server.received_requests().await.unwrap();
    let insert = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
    let prefer = insert.headers.get("prefer").unwrap().to_str().unwrap();
    assert_eq!(prefer, "return=representation");
    let body: serde_json::Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(body[0]["user_id"], "u1");
    assert_eq!(body[0]["description"], "Grocery Store");
    assert_eq!(body[0]["date"], "2024-12-05");
}

#[tokio::test]
async fn budget_limit_upserts_on_user_and_category() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/budgets"))
        .and(query_param("on_conflict", "user_id,category"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": "b1",
            "user_id": "u1",
            "category": "Food & Dining",
            "monthly_limit": 200,
            "created_at": "2024-12-01T00:00:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let budget = service(&server)
        .await
        .set_budget("Food & Dining", Decimal::from(200), Some("u1"))
        .await
        .unwrap();
    assert_eq!(budget.monthly_limit, Decimal::from(200));

    let requests = server.received_requests().await.unwrap();
    let prefer = requests[0].headers.get("prefer").unwrap().to_str().unwrap();
    assert!(prefer.contains("resolution=merge-duplicates"));
    assert!(prefer.contains("return=representation"));
}

#[tokio::test]
async fn non_positive_amounts_never_reach_the_store() {
    let server = MockServer::start().await;
    let data = service(&server).await;

    let draft = NewExpense::new(Decimal::ZERO, "Shopping", "Nothing", Utc::now().date_naive());
    assert!(matches!(data.create_expense(&draft, None).await, Err(StoreError::Invalid(_))));
    assert!(matches!(
        data.set_budget("Shopping", Decimal::from(-5), None).await,
        Err(StoreError::Invalid(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_targets_one_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/expenses"))
        .and(query_param("id", "eq.e1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    service(&server).await.delete_expense("e1").await.unwrap();
}

#[tokio::test]
async fn december_spending_ends_at_new_year() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .and(query_param("select", "amount,category,date"))
        .and(query_param("date", "gte.2024-12-01"))
        .and(query_param("date", "lt.2025-01-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 100, "category": "Shopping", "date": "2024-12-03" },
            { "amount": 50.25, "category": "Shopping", "date": "2024-12-31" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let data = service(&server).await;
    let rows = data.monthly_spending(2024, 12).await.unwrap();
    let total: Decimal = rows.iter().map(|r| r.amount).sum();
    assert_eq!(total, Decimal::new(15025, 2));

    assert!(matches!(data.monthly_spending(2024, 13).await, Err(StoreError::Invalid(_))));
}

#[tokio::test]
async fn missing_profile_is_none_and_update_upserts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .and(query_param("id", "eq.u1"))
        .and(header("accept", "application/vnd.pgrst.object+json"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "details": "The result contains 0 rows",
            "message": "JSON object requested, multiple (or no) rows returned"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/user_profiles"))
        .and(query_param("on_conflict", "id"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": "u1",
            "monthly_income": 52000,
            "currency": "INR",
            "created_at": "2024-12-01T00:00:00+00:00"
        }])))
        .mount(&server)
        .await;

    let data = service(&server).await;
    assert!(data.get_user_profile("u1").await.unwrap().is_none());

    let profile = data
        .update_user_profile(&ProfileUpdate {
            id: "u1".into(),
            monthly_income: Some(Decimal::from(52000)),
            currency: None,
        })
        .await
        .unwrap();
    assert_eq!(profile.monthly_income, Some(Decimal::from(52000)));
    assert_eq!(profile.currency, "INR");
}

#[tokio::test]
async fn missing_expenses_table_keeps_new_expense_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/expenses"))
        .respond_with(table_missing("expenses"))
        .expect(1)
        .mount(&server)
        .await;

    let draft = NewExpense::new(
        Decimal::new(7550, 2),
        "Transportation",
        "Metro card",
        NaiveDate::from_ymd_opt(2024, 12, 5).unwrap(),
    )
    .with_note("monthly pass");
    let before = Utc::now();
    let row = service(&server).await.create_expense(&draft, Some("u1")).await.unwrap();

    assert!(!row.id.is_empty());
    assert!(row.created_at >= before && row.created_at <= Utc::now());
    assert_eq!(row.user_id.as_deref(), Some("u1"));
    assert_eq!(row.amount, draft.amount);
    assert_eq!(row.category, "Transportation");
    assert_eq!(row.description, "Metro card");
    assert_eq!(row.date, draft.date);
    assert_eq!(row.note.as_deref(), Some("monthly pass"));
}

#[tokio::test]
async fn anonymous_budget_upserts_on_category_and_falls_back_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/budgets"))
        .and(query_param("on_conflict", "category"))
        .respond_with(table_missing("budgets"))
        .expect(1)
        .mount(&server)
        .await;

    let before = Utc::now();
    let budget = service(&server)
        .await
        .set_budget("Gaming", Decimal::from(100), None)
        .await
        .unwrap();

    assert!(!budget.id.is_empty());
    assert!(budget.created_at >= before);
    assert!(budget.user_id.is_none());
    assert_eq!(budget.category, "Gaming");
    assert_eq!(budget.monthly_limit, Decimal::from(100));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body[0]["category"], "Gaming");
}

#[tokio::test]
async fn this_month_spending_is_grouped_by_category() {
    let server = MockServer::start().await;
    let first = Utc::now().date_naive().with_day(1).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/expenses"))
        .and(query_param("select", "amount,category,date"))
        .and(query_param("date", format!("gte.{first}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 300, "category": "Food & Dining", "date": first.to_string() },
            { "amount": 150.5, "category": "Food & Dining", "date": first.to_string() },
            { "amount": 80, "category": "Shopping", "date": first.to_string() }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let by_category = service(&server).await.category_spending_this_month().await.unwrap();

    assert_eq!(by_category.len(), 2);
    assert_eq!(by_category["Food & Dining"], Decimal::new(4505, 1));
    assert_eq!(by_category["Shopping"], Decimal::from(80));
}
