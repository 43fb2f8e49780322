use thiserror::Error;

use crate::service::finance::ProviderError;
use crate::service::storage::StoreError;

/// Failures that reach callers. Provider faults during fetches and cache faults are absorbed
/// where they happen; provider construction failures surface from `AppContext::open`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, Error>;
