//! Errors surfaced by the background-refresh scheduler (§4.F, §7
//! `ErrRefreshFailed`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no refresh task registered for route {0}")]
    RouteNotFound(String),

    #[error("refresh callback failed for route {route} after {retries} retries: {message}")]
    RefreshFailed { route: String, retries: u32, message: String },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
