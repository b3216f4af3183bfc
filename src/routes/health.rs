use actix_web::{get, http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;
use log::warn;
use serde_json::json;

use crate::auth::SessionManager;

/// Health check endpoint
///
/// Served outside `/api`, so it never needs a token. Reports whether the
/// revocation ledger answers; while it does not, every token check is
/// degraded, so the endpoint answers 503.
#[get("/health")]
pub async fn health(sessions: Option<web::Data<SessionManager>>) -> impl Responder {
    let ledger = match sessions {
        Some(sessions) => match sessions.ledger().ping().await {
            Ok(()) => "up",
            Err(e) => {
                warn!("Health check: revocation ledger unreachable: {}", e);
                "down"
            }
        },
        None => "unconfigured",
    };

    let (status, code) = if ledger == "down" {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("ok", StatusCode::OK)
    };

    HttpResponse::build(code).json(json!({
        "status": status,
        "ledger": ledger,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::AuthConfig;
    use crate::ledger::tests::UnreachableStore;
    use crate::ledger::{FailurePolicy, LedgerStore, MemoryLedgerStore, RevocationLedger};
    use actix_web::test;
    use chrono::Duration;
    use std::sync::Arc;

    fn sessions(store: Arc<dyn LedgerStore>) -> web::Data<SessionManager> {
        let config = AuthConfig {
            access_secret: "health-access".into(),
            refresh_secret: "health-refresh".into(),
            access_ttl: Duration::minutes(10),
            refresh_ttl: Duration::days(1),
            failure_policy: FailurePolicy::FailClosed,
            register_issued_tokens: false,
        };
        let ledger = RevocationLedger::new(store, FailurePolicy::FailClosed);
        web::Data::new(SessionManager::new(&config, ledger, Arc::new(SystemClock)))
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(actix_web::App::new().service(health)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["ledger"], "unconfigured");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn test_health_reports_ledger_state() {
        let up = sessions(Arc::new(MemoryLedgerStore::new(Arc::new(SystemClock))));
        let app = test::init_service(actix_web::App::new().app_data(up).service(health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(json["ledger"], "up");

        let down = sessions(Arc::new(UnreachableStore));
        let app = test::init_service(actix_web::App::new().app_data(down).service(health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["ledger"], "down");
    }
}
