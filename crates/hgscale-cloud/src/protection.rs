//! Bounded-concurrency termination-protection toggles.
//!
//! One task per instance, at most `concurrency` calls in flight. The
//! caller gets back which instances were updated and which failed; only
//! the updated ones may proceed to termination.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::api::ComputeApi;
use crate::error::CloudError;
use crate::types::InstanceId;

/// Result of a bulk protection toggle.
#[derive(Debug, Default)]
pub struct ProtectionOutcome {
    /// Instances whose protection flag was set, in input order.
    pub updated: Vec<InstanceId>,
    /// Instances whose call failed, in input order.
    pub failed: Vec<(InstanceId, CloudError)>,
}

/// Set termination protection to `enabled` on every instance in `instance_ids`.
pub async fn set_termination_protection(
    compute: Arc<dyn ComputeApi>,
    instance_ids: &[InstanceId],
    enabled: bool,
    concurrency: usize,
) -> ProtectionOutcome {
    debug!(
        count = instance_ids.len(),
        enabled, concurrency, "setting termination protection"
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<(usize, Result<(), CloudError>)> = JoinSet::new();

    for (index, instance_id) in instance_ids.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let compute = Arc::clone(&compute);
        let instance_id = instance_id.clone();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = CloudError::api("termination-protection", e.to_string());
                    return (index, Err(err));
                }
            };
            let result = compute
                .set_termination_protection(&instance_id, enabled)
                .await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<(), CloudError>>> = vec![None; instance_ids.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            // A panicked task leaves its slot empty; reported as failed below.
            Err(join_error) => warn!(error = %join_error, "protection task failed"),
        }
    }

    let mut outcome = ProtectionOutcome::default();
    for (instance_id, result) in instance_ids.iter().zip(results) {
        match result {
            Some(Ok(())) => outcome.updated.push(instance_id.clone()),
            Some(Err(e)) => {
                warn!(%instance_id, error = %e, "failed to set termination protection");
                outcome.failed.push((instance_id.clone(), e));
            }
            None => outcome.failed.push((
                instance_id.clone(),
                CloudError::api("termination-protection", "task produced no result"),
            )),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::CloudResult;
    use crate::types::InstanceDetails;

    /// Tracks peak concurrency; fails for ids in `fail`.
    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail: Vec<String>,
    }

    #[async_trait]
    impl ComputeApi for Probe {
        async fn describe_instances(&self, _: &[InstanceId]) -> CloudResult<Vec<InstanceDetails>> {
            Ok(vec![])
        }

        async fn set_termination_protection(&self, instance_id: &str, _: bool) -> CloudResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.iter().any(|f| f == instance_id) {
                return Err(CloudError::api("ModifyInstanceAttribute", "throttled"));
            }
            Ok(())
        }

        async fn terminate_instances(&self, _: &[InstanceId]) -> CloudResult<()> {
            Ok(())
        }
    }

    fn ids(n: usize) -> Vec<InstanceId> {
        (0..n).map(|i| format!("i-{i:02}")).collect()
    }

    #[tokio::test]
    async fn all_succeed_in_input_order() {
        let probe = Arc::new(Probe::default());
        let outcome = set_termination_protection(probe, &ids(10), false, 20).await;

        assert_eq!(outcome.updated, ids(10));
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn failure_excludes_only_that_instance() {
        let probe = Arc::new(Probe {
            fail: vec!["i-03".to_string()],
            ..Default::default()
        });
        let outcome = set_termination_protection(probe, &ids(10), false, 20).await;

        assert_eq!(outcome.updated.len(), 9);
        assert!(!outcome.updated.contains(&"i-03".to_string()));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "i-03");
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let probe = Arc::new(Probe::default());
        let outcome = set_termination_protection(probe.clone(), &ids(50), false, 4).await;

        assert_eq!(outcome.updated.len(), 50);
        assert!(probe.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn empty_input_is_empty_outcome() {
        let probe = Arc::new(Probe::default());
        let outcome = set_termination_protection(probe, &[], false, 20).await;
        assert!(outcome.updated.is_empty());
        assert!(outcome.failed.is_empty());
    }
}
