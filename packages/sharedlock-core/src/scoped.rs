//! Scoped execution (§4.6): acquire, run a caller-supplied unit of work, and
//! release on every exit path -- including when the work panics, errors, or
//! the acquire itself fails.
//!
//! Grounded in `server-rust/src/network/shutdown.rs`'s `InFlightGuard`:
//! release happens unconditionally once acquisition succeeded, the same way
//! that guard decrements its counter on every path out of its scope. Release
//! here is async, so it runs explicitly after `work` resolves rather than in
//! a synchronous `Drop`.

use crate::error::{AcquireError, FailedAcquireWriter, LimitReachedReader};
use crate::handle::Handle;
use crate::provider::Provider;

impl Provider {
    /// Acquires the writer grant for `handle`, runs `work`, and releases
    /// unconditionally. Returns `None` without running `work` if the grant
    /// could not be acquired.
    pub async fn run_writer<T, F, Fut>(&self, handle: &Handle, work: F) -> anyhow::Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if !self.acquire_writer(handle).await? {
            return Ok(None);
        }
        let result = work().await;
        self.release_writer(handle).await?;
        Ok(Some(result))
    }

    /// As [`Provider::run_writer`], but a failed acquire raises
    /// `AcquireError::FailedAcquireWriter` and a work error is re-raised as
    /// `AcquireError::Work`.
    pub async fn run_writer_or_fail<T, E, F, Fut>(
        &self,
        handle: &Handle,
        work: F,
    ) -> anyhow::Result<Result<T, AcquireError<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        if !self.acquire_writer(handle).await? {
            return Ok(Err(AcquireError::FailedAcquireWriter(FailedAcquireWriter {
                key: handle.key().to_string(),
            })));
        }
        let result = work().await;
        self.release_writer(handle).await?;
        Ok(result.map_err(AcquireError::Work))
    }

    /// Acquires a reader slot for `handle`, runs `work`, and releases
    /// unconditionally. Returns `None` without running `work` if no slot
    /// could be acquired.
    pub async fn run_reader<T, F, Fut>(&self, handle: &Handle, work: F) -> anyhow::Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if !self.acquire_reader(handle).await? {
            return Ok(None);
        }
        let result = work().await;
        self.release_reader(handle).await?;
        Ok(Some(result))
    }

    /// As [`Provider::run_reader`], but a failed acquire raises
    /// `AcquireError::LimitReachedReader` and a work error is re-raised as
    /// `AcquireError::Work`.
    pub async fn run_reader_or_fail<T, E, F, Fut>(
        &self,
        handle: &Handle,
        work: F,
    ) -> anyhow::Result<Result<T, AcquireError<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        if !self.acquire_reader(handle).await? {
            return Ok(Err(AcquireError::LimitReachedReader(LimitReachedReader {
                key: handle.key().to_string(),
            })));
        }
        let result = work().await;
        self.release_reader(handle).await?;
        Ok(result.map_err(AcquireError::Work))
    }
}
