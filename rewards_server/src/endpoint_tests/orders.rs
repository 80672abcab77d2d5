use actix_web::{cookie::Cookie, http::StatusCode, test, App};
use rewards_engine::db_types::{OrderInsert, OrderStatusType};
use serde_json::Value;

use crate::{
    auth::AUTH_COOKIE,
    endpoint_tests::helpers::{bearer, configure_app, order, test_issuer, user, TestBackends},
};

const VALID_NUMBER: &str = "79927398713";

#[actix_web::test]
async fn upload_is_accepted_for_processing() {
    let _ = env_logger::try_init();
    let mut backends = TestBackends::default();
    backends
        .orders
        .expect_insert_order()
        .withf(|user_id, number| *user_id == 1 && number == VALID_NUMBER)
        .returning(|user_id, number| Ok(OrderInsert::Created(order(5, user_id, number, OrderStatusType::New, 0))));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(auth)
        .insert_header(("Content-Type", "text/plain"))
        .set_payload(VALID_NUMBER)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[actix_web::test]
async fn repeat_upload_by_the_same_user_is_ok() {
    let mut backends = TestBackends::default();
    backends.orders.expect_insert_order().returning(|_, _| Ok(OrderInsert::AlreadyUploaded));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(auth)
        .insert_header(("Content-Type", "text/plain"))
        .set_payload(VALID_NUMBER)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn upload_of_a_foreign_order_conflicts() {
    let mut backends = TestBackends::default();
    backends.orders.expect_insert_order().returning(|_, _| Ok(OrderInsert::UploadedByAnother));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(auth)
        .insert_header(("Content-Type", "text/plain"))
        .set_payload(VALID_NUMBER)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn upload_with_a_bad_checksum_is_unprocessable() {
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(auth)
        .insert_header(("Content-Type", "text/plain"))
        .set_payload("1111")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn upload_requires_text_plain() {
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), issuer))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(auth)
        .insert_header(("Content-Type", "application/json"))
        .set_payload(VALID_NUMBER)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn upload_without_a_token_is_unauthorized() {
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/orders")
        .insert_header(("Content-Type", "text/plain"))
        .set_payload(VALID_NUMBER)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn empty_order_list_is_no_content() {
    let mut backends = TestBackends::default();
    backends.orders.expect_orders_for_user().returning(|_| Ok(vec![]));
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get().uri("/api/user/orders").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn order_list_serializes_the_public_shape() {
    let mut backends = TestBackends::default();
    backends.orders.expect_orders_for_user().returning(|user_id| {
        Ok(vec![
            order(1, user_id, "79927398713", OrderStatusType::Processed, 4_250),
            order(2, user_id, "4561261212345467", OrderStatusType::New, 0),
        ])
    });
    let issuer = test_issuer();
    let auth = bearer(&issuer, &user(1, "alice"));
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get().uri("/api/user/orders").insert_header(auth).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["number"], "79927398713");
    assert_eq!(orders[0]["status"], "PROCESSED");
    assert_eq!(orders[0]["accrual"], 42.5);
    assert!(orders[0].get("id").is_none(), "internal ids must not leak");
    assert_eq!(orders[1]["status"], "NEW");
    assert!(orders[1].get("accrual").is_none(), "zero accrual is omitted");
}

#[actix_web::test]
async fn the_auth_cookie_works_too() {
    let mut backends = TestBackends::default();
    backends.orders.expect_orders_for_user().returning(|_| Ok(vec![]));
    let issuer = test_issuer();
    let token = issuer.issue_token(&user(1, "alice")).unwrap();
    let app = test::init_service(App::new().configure(configure_app(backends, issuer))).await;

    let req = test::TestRequest::get()
        .uri("/api/user/orders")
        .cookie(Cookie::new(AUTH_COOKIE, token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}
