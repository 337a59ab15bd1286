//! Route guard decisions and the navigation they trigger.

mod common;

use common::*;
use reqwest::Method;
use storefront_core::auth::{guard, GuardOptions, GuardOutcome};
use storefront_core::models::LoginResponse;

#[tokio::test]
async fn anonymous_user_is_sent_to_login_with_redirect() {
    let h = Harness::start().await;

    let outcome = guard(&h.session, "/pages/checkout.html", GuardOptions::default());

    let expected = format!("{}?redirect=%2Fpages%2Fcheckout.html", LOGIN_PATH);
    assert_eq!(outcome, GuardOutcome::LoginRequired { location: expected.clone() });
    assert_eq!(h.navigator.last(), Some(expected));
}

#[tokio::test]
async fn public_pages_are_always_allowed() {
    let h = Harness::start().await;
    assert!(guard(&h.session, "/index.html", GuardOptions::public()).is_allowed());
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn anonymous_catalog_reads_pass_but_account_reads_do_not() {
    let h = Harness::start().await;

    let catalog = GuardOptions::for_request(&Method::GET, "/api/products/");
    assert!(guard(&h.session, "/api/products/", catalog).is_allowed());
    assert_eq!(h.navigator.count(), 0);

    let orders = GuardOptions::for_request(&Method::GET, "/api/orders/history");
    assert!(matches!(
        guard(&h.session, "/api/orders/history", orders),
        GuardOutcome::LoginRequired { .. }
    ));
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn non_admin_is_sent_home_from_admin_area() {
    let h = Harness::start().await;
    h.session.login(login_response(&valid_token("user"), Some("rt"))).unwrap();

    let outcome = guard(
        &h.session,
        "/admin/products.html",
        GuardOptions::for_path("/admin/products.html"),
    );

    assert_eq!(outcome, GuardOutcome::Forbidden);
    assert_eq!(h.navigator.last().as_deref(), Some(HOME_PATH));
}

#[tokio::test]
async fn admin_is_allowed_into_admin_area() {
    let h = Harness::start().await;
    h.session
        .login(LoginResponse {
            token: valid_token("admin"),
            refresh_token: Some("rt".to_string()),
            user: profile(true),
        })
        .unwrap();

    assert!(guard(&h.session, "/admin/brands.html", GuardOptions::admin()).is_allowed());
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn expired_admin_session_requires_login_first() {
    let h = Harness::start().await;
    h.session
        .login(LoginResponse {
            token: expired_token("admin"),
            refresh_token: Some("rt".to_string()),
            user: profile(true),
        })
        .unwrap();

    let outcome = guard(&h.session, "/admin/users.html", GuardOptions::admin());
    assert!(matches!(outcome, GuardOutcome::LoginRequired { .. }));
}
