use actix_web::dev::Server;
use actix_web::middleware::DefaultHeaders;
use actix_web::{http::header, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::configuration::LoginSettings;
use crate::credentials::CredentialStore;
use crate::issuance::TokenService;
use crate::middleware::{JwtMiddleware, ServerTiming};
use crate::routes::{auth, credentials, health_check, token_store};
use crate::security::CACHE_CONTROL_ALL_OFF;
use crate::token_store::RefreshTokenStore;

/// `Server-Timing` key of this service
const SERVER_TIMING_KEY: &str = "auth";

/// Everything the handlers share
#[derive(Clone)]
pub struct Services {
    pub credentials: Arc<dyn CredentialStore>,
    pub tokens: TokenService,
    /// Present when this instance owns the refresh token store and serves `/tokens`
    pub local_token_store: Option<Arc<dyn RefreshTokenStore>>,
    pub login: LoginSettings,
}

/// Public surface: registration, login, rotation and the guarded mutations
pub fn run(listener: TcpListener, services: Services) -> Result<Server, std::io::Error> {
    let credentials = web::Data::from(services.credentials);
    let tokens = web::Data::new(services.tokens);
    let login = web::Data::new(services.login);

    let server = HttpServer::new(move || {
        let signer = tokens.signer().clone();

        App::new()
            // Global middleware
            .wrap(DefaultHeaders::new().add((header::CACHE_CONTROL, CACHE_CONTROL_ALL_OFF)))
            .wrap(ServerTiming::new(SERVER_TIMING_KEY))
            // Shared state
            .app_data(credentials.clone())
            .app_data(tokens.clone())
            .app_data(login.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    // Public routes
                    .route("/register", web::post().to(auth::register))
                    .route("/login", web::post().to(auth::login))
                    .route("/refresh", web::post().to(auth::refresh))
                    // Protected routes (require an access token)
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(signer))
                            .route("/logout", web::post().to(auth::logout))
                            .route("/{id}/username", web::put().to(auth::update_username))
                            .route("/{id}/secret", web::put().to(auth::update_secret))
                            .route("/{id}/groups", web::put().to(auth::update_groups))
                            .route("/{id}", web::delete().to(auth::delete)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Service-to-service surface: issuance for pre-authenticated subjects,
/// the credential store API and, when owned, the refresh token store API
///
/// Nothing here checks the caller, so the listener must only be reachable
/// from trusted services.
pub fn run_internal(listener: TcpListener, services: Services) -> Result<Server, std::io::Error> {
    let credentials = web::Data::from(services.credentials);
    let tokens = web::Data::new(services.tokens);
    let local_token_store = services.local_token_store.map(web::Data::from);

    let server = HttpServer::new(move || {
        let app = App::new()
            .wrap(DefaultHeaders::new().add((header::CACHE_CONTROL, CACHE_CONTROL_ALL_OFF)))
            .wrap(ServerTiming::new(SERVER_TIMING_KEY))
            .app_data(credentials.clone())
            .app_data(tokens.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/generate", web::post().to(auth::generate))
            .service(
                web::scope("/credentials")
                    .route("", web::post().to(credentials::create))
                    .route("/{id}/username", web::put().to(credentials::update_username))
                    .route("/{id}/secret", web::put().to(credentials::update_secret))
                    .route("/{id}/groups", web::put().to(credentials::update_groups))
                    // one resource: GET takes a username, DELETE an id
                    .route("/{key}", web::get().to(credentials::find))
                    .route("/{key}", web::delete().to(credentials::delete)),
            );

        match &local_token_store {
            Some(store) => app.app_data(store.clone()).service(
                web::scope("/tokens")
                    .route("", web::put().to(token_store::put))
                    // before /{subject_id}
                    .route("/expired", web::delete().to(token_store::sweep_expired))
                    .route("/{subject_id}", web::get().to(token_store::pop_groups))
                    .route("/{subject_id}", web::delete().to(token_store::delete_for_subject)),
            ),
            None => app,
        }
    })
    .listen(listener)?
    .run();

    Ok(server)
}
