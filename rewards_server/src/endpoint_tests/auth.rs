use actix_web::{http::StatusCode, test, App};
use rewards_engine::traits::AuthApiError;
use serde_json::json;

use crate::{
    data_objects::AuthResponse,
    endpoint_tests::helpers::{configure_app, test_issuer, user, user_with_password, TestBackends},
};

#[actix_web::test]
async fn register_issues_a_session() {
    let _ = env_logger::try_init();
    let mut backends = TestBackends::default();
    backends.auth.expect_create_user().returning(|login, _hash| Ok(user(1, login)));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"login": "alice", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("Authorization"));
    assert!(resp.headers().contains_key("set-cookie"));
    let body: AuthResponse = test::read_body_json(resp).await;
    assert_eq!(body.user_id, 1);
    assert_eq!(body.login, "alice");
}

#[actix_web::test]
async fn register_hashes_before_storing() {
    let mut backends = TestBackends::default();
    backends
        .auth
        .expect_create_user()
        .withf(|_login, hash| hash != "pw" && hash.starts_with("$argon2"))
        .returning(|login, _hash| Ok(user(1, login)));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"login": "alice", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn register_conflicts_on_taken_login() {
    let mut backends = TestBackends::default();
    backends.auth.expect_create_user().returning(|login, _| Err(AuthApiError::LoginTaken(login.to_string())));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/register")
        .set_json(json!({"login": "alice", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn register_requires_login_and_password() {
    let app = test::init_service(App::new().configure(configure_app(TestBackends::default(), test_issuer()))).await;

    for body in [json!({"login": "", "password": "pw"}), json!({"login": "alice", "password": ""})] {
        let req = test::TestRequest::post().uri("/api/user/register").set_json(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#[actix_web::test]
async fn login_succeeds_with_the_right_password() {
    let mut backends = TestBackends::default();
    backends
        .auth
        .expect_fetch_user_by_login()
        .returning(|login| Ok(Some(user_with_password(7, login, "hunter2"))));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "bob", "password": "hunter2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: AuthResponse = test::read_body_json(resp).await;
    assert_eq!(body.user_id, 7);
}

#[actix_web::test]
async fn login_rejects_a_wrong_password() {
    let mut backends = TestBackends::default();
    backends
        .auth
        .expect_fetch_user_by_login()
        .returning(|login| Ok(Some(user_with_password(7, login, "hunter2"))));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "bob", "password": "letmein"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_rejects_an_unknown_login() {
    let mut backends = TestBackends::default();
    backends.auth.expect_fetch_user_by_login().returning(|_| Ok(None));
    let app = test::init_service(App::new().configure(configure_app(backends, test_issuer()))).await;

    let req = test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"login": "nobody", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
