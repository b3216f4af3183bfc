use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::{info, warn};
use sqlx::PgPool;
use std::io;
use std::sync::Arc;

use authforge::auth::{AuthMiddleware, SessionManager};
use authforge::clock::{Clock, SystemClock};
use authforge::config::Config;
use authforge::directory::{InMemoryUserDirectory, PgUserDirectory, UserDirectory};
use authforge::ledger::memory::start_cleanup_task;
use authforge::ledger::{LedgerStore, MemoryLedgerStore, RedisLedgerStore, RevocationLedger};
use authforge::routes::{self, health};

const LEDGER_CLEANUP_INTERVAL_SECS: u64 = 60;

fn startup_error<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> io::Error + '_ {
    move |e| io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(startup_error("Invalid configuration"))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn LedgerStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisLedgerStore::connect(url)
                .await
                .map_err(startup_error("Failed to connect to Redis"))?,
        ),
        None => {
            warn!("REDIS_URL not set; revocations are kept in process memory only");
            let memory = Arc::new(MemoryLedgerStore::new(clock.clone()));
            actix_web::rt::spawn(start_cleanup_task(
                memory.clone(),
                LEDGER_CLEANUP_INTERVAL_SECS,
            ));
            memory
        }
    };
    let ledger = RevocationLedger::new(store, config.auth.failure_policy);
    info!("Revocation ledger failure policy: {:?}", ledger.policy());
    let sessions = web::Data::new(SessionManager::new(&config.auth, ledger, clock));

    let directory: Arc<dyn UserDirectory> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .map_err(startup_error("Failed to connect to database"))?;
            Arc::new(PgUserDirectory::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using an in-memory user directory");
            Arc::new(InMemoryUserDirectory::new())
        }
    };
    let directory: web::Data<dyn UserDirectory> = web::Data::from(directory);

    info!("Starting authforge server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(sessions.clone())
            .app_data(directory.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
