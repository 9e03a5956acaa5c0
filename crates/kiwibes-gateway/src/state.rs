//! Shared application state handed to every Axum handler.

use std::sync::Arc;

use crate::auth_guard::AuthGuard;
use crate::catalog::Catalog;
use crate::datastore::DataStore;
use crate::executor::Executor;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub datastore: Arc<DataStore>,
    pub executor: Arc<Executor>,
    pub auth: Arc<AuthGuard>,
}
