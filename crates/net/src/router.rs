use axum::{
    handler::Handler,
    routing::{get, post},
    Router,
};

/// Merges the `(path, router)` components and attaches the shared state.
pub fn main_router<S>(components: Vec<(String, Router<S>)>, state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
{
    components
        .into_iter()
        .fold(Router::<S>::new(), |app, (_, router)| app.merge(router))
        .with_state(state)
}

pub fn get_router_builder<T, S>(path: &str, handler: impl Handler<T, S> + Clone + Send + 'static) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    (path.to_string(), Router::<S>::new().route(path, get(handler)))
}

pub fn post_router_builder<T, S>(path: &str, handler: impl Handler<T, S> + Clone + Send + 'static) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    (path.to_string(), Router::<S>::new().route(path, post(handler)))
}
