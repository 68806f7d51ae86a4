use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use server::handlers;
use server::server::spawn_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let srv_tx = spawn_server();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
    log::info!("Listening on {}", bind_addr);

    HttpServer::new(move || {
        let cors = match std::env::var("CORS_ALLOWED_ORIGIN") {
            Ok(origin) => Cors::default()
                .allowed_origin(&origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            Err(_) => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .app_data(web::Data::new(srv_tx.clone()))
            .configure(handlers::root)
    })
    .bind(bind_addr)?
    .run()
    .await
}
