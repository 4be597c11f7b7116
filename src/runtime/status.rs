// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain condition poll for container status.
//!
//! Unlike [`Waiter`](super::Waiter) there is no check to run: the container
//! is reloaded and its status compared to a target until they match or the
//! budget runs out.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::{ContainerHandle, ContainerStatus};
use crate::config::DEFAULT_STEP;
use crate::error::{Result, WaitError};

/// Wait until `container` reports `target`, polling every 100 ms.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] carrying the last observed status when the
/// target is not reached in time. Reload errors are returned as they are.
pub async fn wait_for_status<C>(
    container: &mut C,
    target: ContainerStatus,
    timeout: Duration,
) -> Result<()>
where
    C: ContainerHandle + ?Sized,
{
    wait_for_status_with_step(container, target, timeout, DEFAULT_STEP).await
}

/// Same as [`wait_for_status`] with an explicit poll interval.
pub async fn wait_for_status_with_step<C>(
    container: &mut C,
    target: ContainerStatus,
    timeout: Duration,
    step: Duration,
) -> Result<()>
where
    C: ContainerHandle + ?Sized,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        container.reload().await?;
        if container.status() == target {
            debug!(
                container = container.name(),
                status = %target,
                elapsed = ?start.elapsed(),
                "container reached status"
            );
            return Ok(());
        }
        tokio::time::sleep(step).await;
    }

    let last = container.status();
    warn!(
        container = container.name(),
        last = %last,
        target = %target,
        "container did not reach status"
    );
    Err(WaitError::Timeout {
        resource: container.name().to_string(),
        last,
        target,
        timeout,
    })
}
