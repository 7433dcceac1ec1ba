//! Credential and upload bridge between the local store and the backend.

mod backend;
mod credentials;
mod http;
mod session;

pub use backend::BackendConnector;
pub use credentials::Credentials;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient};
pub use session::SyncSession;
