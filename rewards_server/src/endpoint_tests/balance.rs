use actix_web::{http::StatusCode, test, App};
use rewards_engine::{db_types::Balance, traits::WithdrawalError};
use rwd_common::Points;
use serde_json::{json, Value};

use crate::endpoint_tests::helpers::{bearer, configure_app, test_issuer, user, withdrawal, TestBackends};

#[actix_web::test]
async fn balance_reports_current_and_withdrawn() {
    let _ = env_logger::try_init();
    let mut backends = TestBackends::default();
    backends
        .balance
        .expect_balance_for_user()
        .returning(|_| Ok(Balance { current: Points::from(50_050), withdrawn: Points::from(4_200) }));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get().uri("/api/user/balance").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["current"], 500.5);
    assert_eq!(body["withdrawn"], 42.0);
}

#[actix_web::test]
async fn withdrawal_succeeds_when_funds_cover_it() {
    let mut backends = TestBackends::default();
    backends
        .balance
        .expect_withdraw()
        .withf(|user_id, order, sum| *user_id == 1 && order == "2377225624" && *sum == Points::from(75_100))
        .returning(|user_id, order, sum| {
            let mut w = withdrawal(1, user_id, order, 0);
            w.sum = sum;
            Ok(w)
        });
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/balance/withdraw")
        .insert_header(auth)
        .set_json(json!({"order": "2377225624", "sum": 751}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["order"], "2377225624");
    assert_eq!(body["sum"], 751.0);
}

#[actix_web::test]
async fn withdrawal_fails_with_402_when_funds_are_short() {
    let mut backends = TestBackends::default();
    backends.balance.expect_withdraw().returning(|_, _, _| Err(WithdrawalError::InsufficientFunds));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/balance/withdraw")
        .insert_header(auth)
        .set_json(json!({"order": "2377225624", "sum": 100000}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
}

#[actix_web::test]
async fn withdrawal_against_a_bad_number_is_unprocessable() {
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/balance/withdraw")
        .insert_header(auth)
        .set_json(json!({"order": "123", "sum": 10}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn withdrawal_of_a_non_positive_sum_is_a_bad_request() {
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), issuer))).await;

    for sum in [0, -5] {
        let req = test::TestRequest::post()
            .uri("/api/user/balance/withdraw")
            .insert_header(auth.clone())
            .set_json(json!({"order": "2377225624", "sum": sum}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#[actix_web::test]
async fn empty_withdrawal_list_is_no_content() {
    let mut backends = TestBackends::default();
    backends.balance.expect_withdrawals_for_user().returning(|_| Ok(vec![]));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get().uri("/api/user/withdrawals").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn withdrawal_list_serializes_the_public_shape() {
    let mut backends = TestBackends::default();
    backends
        .balance
        .expect_withdrawals_for_user()
        .returning(|user_id| Ok(vec![withdrawal(1, user_id, "2377225624", 75_100)]));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get().uri("/api/user/withdrawals").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["order"], "2377225624");
    assert_eq!(list[0]["sum"], 751.0);
    assert!(list[0].get("processed_at").is_some());
}
