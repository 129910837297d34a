//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;

use crate::error::{BoxError, WorkError};
use crate::{Error, Result};

/// Run synchronous work on the blocking pool of `handle`.
///
/// A panic inside `f` is returned as `WorkError::Panicked` rather than
/// unwinding into the caller. `permit` travels with `f` onto the blocking
/// thread and is released when `f` returns, even if the returned future was
/// dropped long before.
pub async fn blocking<F, T, E>(
    handle: &Handle,
    permit: Option<OwnedSemaphorePermit>,
    f: F,
) -> std::result::Result<T, WorkError>
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError>,
{
    let joined = handle
        .spawn_blocking(move || -> std::result::Result<T, BoxError> {
            let _permit = permit;
            f().map_err(Into::into)
        })
        .await;
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(cause)) => Err(WorkError::Failed(cause)),
        Err(join_err) => match join_err.try_into_panic() {
            Ok(payload) => Err(WorkError::from_panic(payload)),
            Err(join_err) => Err(WorkError::failed(join_err)),
        },
    }
}

/// Await `fut`, giving up after `duration` when one is set.
pub async fn with_deadline<F>(duration: Option<Duration>, fut: F) -> Result<F::Output>
where
    F: Future,
{
    match duration {
        Some(duration) => timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration)),
        None => Ok(fut.await),
    }
}
