use crate::auth;
use crate::handlers;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// The admin control surface plus the DoH endpoint.
///
/// Everything under `/control` except login sits behind the session
/// middleware; `/dns-query` is open (DoH clients are not browser sessions).
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/control/logout", get(auth::logout))
        .route("/control/status", get(handlers::status::status))
        .route("/control/profile", get(handlers::status::profile))
        .route("/control/filtering/status", get(handlers::filtering::status))
        .route("/control/filtering/config", post(handlers::filtering::set_config))
        .route("/control/filtering/add_url", post(handlers::filtering::add_url))
        .route("/control/filtering/remove_url", post(handlers::filtering::remove_url))
        .route("/control/filtering/set_url", post(handlers::filtering::set_url))
        .route("/control/filtering/refresh", post(handlers::filtering::refresh))
        .route("/control/filtering/set_rules", post(handlers::filtering::set_rules))
        .route("/control/filtering/check_host", get(handlers::filtering::check_host))
        .route("/control/clients", get(handlers::clients::list))
        .route("/control/clients/add", post(handlers::clients::add))
        .route("/control/clients/update", post(handlers::clients::update))
        .route("/control/clients/delete", post(handlers::clients::delete))
        .route("/control/clients/find", get(handlers::clients::find))
        .route("/control/blocked_services/all", get(handlers::blocked_services::all))
        .route("/control/blocked_services/list", get(handlers::blocked_services::list))
        .route("/control/blocked_services/set", post(handlers::blocked_services::set))
        .route("/control/access/list", get(handlers::access::list))
        .route("/control/access/set", post(handlers::access::set))
        .route("/control/rewrite/list", get(handlers::rewrites::list))
        .route("/control/rewrite/add", post(handlers::rewrites::add))
        .route("/control/rewrite/delete", post(handlers::rewrites::delete))
        .route("/control/safebrowsing/enable", post(handlers::safety::safebrowsing::enable))
        .route("/control/safebrowsing/disable", post(handlers::safety::safebrowsing::disable))
        .route("/control/safebrowsing/status", get(handlers::safety::safebrowsing::status))
        .route("/control/parental/enable", post(handlers::safety::parental::enable))
        .route("/control/parental/disable", post(handlers::safety::parental::disable))
        .route("/control/parental/status", get(handlers::safety::parental::status))
        .route("/control/safesearch/enable", post(handlers::safety::safesearch::enable))
        .route("/control/safesearch/disable", post(handlers::safety::safesearch::disable))
        .route("/control/safesearch/status", get(handlers::safety::safesearch::status))
        .route("/control/set_upstreams_config", post(handlers::upstreams::set_config))
        .route("/control/test_upstream_dns", post(handlers::upstreams::test))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/control/login", post(auth::login))
        .route("/dns-query", get(handlers::doh::get).post(handlers::doh::post))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
