//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    AppState, Error,
    auth::{api_key_guard, auth_guard, get_me, post_log_in},
    dispatch::{
        create, create_batch, delete_by_id, get_by_id, get_by_owner_args, get_by_owner_id,
        update_by_id,
    },
    endpoints,
    institution::{create_institution_endpoint, get_institution_endpoint, list_institutions},
    logging::logging_middleware,
    statement::{Statement, StatementsForUser},
    transaction::{InstitutionTransactions, StatementTransactions, Transaction, UserTransactions},
    transaction_type::list_transaction_types,
    user::{User, register_user, update_user_endpoint},
};

/// Return a router with all the app's routes.
///
/// Every route except the coffee probe needs the API key. Routes other than
/// log in and registration also need a bearer token.
pub fn build_router(state: AppState) -> Router {
    let open_routes = Router::new().route(endpoints::COFFEE, get(get_coffee));

    let api_key_routes = Router::new()
        .route(endpoints::LOG_IN, post(post_log_in))
        .route(endpoints::USERS, post(register_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_guard));

    // The layer added last runs first, so the API key is checked before the token.
    let protected_routes = Router::new()
        .route(endpoints::ME, get(get_me))
        .route(
            endpoints::USER,
            get(get_by_id::<User>)
                .put(update_user_endpoint)
                .delete(delete_by_id::<User>),
        )
        .route(
            endpoints::INSTITUTIONS,
            get(list_institutions).post(create_institution_endpoint),
        )
        .route(endpoints::INSTITUTION, get(get_institution_endpoint))
        .route(endpoints::TRANSACTION_TYPES, get(list_transaction_types))
        .route(endpoints::STATEMENTS, post(create::<Statement>))
        .route(
            endpoints::STATEMENT,
            get(get_by_id::<Statement>)
                .put(update_by_id::<Statement>)
                .delete(delete_by_id::<Statement>),
        )
        .route(
            endpoints::USER_STATEMENTS,
            get(get_by_owner_id::<StatementsForUser>),
        )
        .route(endpoints::TRANSACTIONS, post(create::<Transaction>))
        .route(
            endpoints::TRANSACTIONS_BATCH,
            post(create_batch::<Transaction>),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_by_id::<Transaction>)
                .put(update_by_id::<Transaction>)
                .delete(delete_by_id::<Transaction>),
        )
        .route(
            endpoints::STATEMENT_TRANSACTIONS,
            get(get_by_id::<StatementTransactions>),
        )
        .route(
            endpoints::USER_TRANSACTIONS,
            get(get_by_owner_id::<UserTransactions>),
        )
        .route(
            endpoints::INSTITUTION_TRANSACTIONS,
            get(get_by_owner_args::<InstitutionTransactions>),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_guard));

    protected_routes
        .merge(api_key_routes)
        .merge(open_routes)
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    (StatusCode::IM_A_TEAPOT, "I'm a teapot").into_response()
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
