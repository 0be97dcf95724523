use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use table_reservations::{
    actions,
    capacity::VenueTable,
    clock::SystemClock,
    config::Config,
    queue::{AmqpNotifier, LogNotifier, Notifier},
    routes,
    service::ReservationService,
    store::{MemoryReservationStore, ReservationStore},
    sweeper,
};

fn io_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

fn initialize_store(config: &Config) -> std::io::Result<Arc<dyn ReservationStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = actions::initialize_db_pool(url).map_err(io_error)?;
            log::info!("Using Postgres reservation store");
            Ok(Arc::new(actions::PgReservationStore::new(pool)))
        }
        None => {
            log::warn!("DATABASE_URL is not set; reservations are kept in memory and lost on restart");
            Ok(Arc::new(MemoryReservationStore::new()))
        }
    }
}

async fn initialize_notifier(config: &Config) -> Arc<dyn Notifier> {
    let Some(amqp) = config.amqp.clone() else {
        log::warn!("AMQP_HOST is not set; new bookings are only logged");
        return Arc::new(LogNotifier);
    };

    let mut notifier = AmqpNotifier::new(amqp);
    match notifier.initialize().await {
        Ok(()) => Arc::new(notifier),
        Err(e) => {
            log::warn!("RabbitMQ unavailable, falling back to log notifications: {:?}", e);
            Arc::new(LogNotifier)
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(io_error)?;

    let store = initialize_store(&config)?;
    let notifier = initialize_notifier(&config).await;

    let service = Arc::new(ReservationService::new(
        store,
        VenueTable::new(config.venues.clone()),
        config.rules,
        Arc::new(SystemClock),
        notifier,
    ));

    let _sweeper = sweeper::spawn_retention_sweeper(Arc::clone(&service), config.sweep_interval);

    let service = web::Data::from(service);

    log::info!("starting HTTP server at http://{}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
