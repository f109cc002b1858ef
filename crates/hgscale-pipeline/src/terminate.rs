//! Terminate stage: reconcile the Scale decision with the instance group.
//!
//! Instances the cluster no longer counts as members are reaped once
//! they are old enough; unhealthy stragglers are detached so the group
//! stops waiting on them. Errors inherited from Scale are carried over
//! first and never rewritten.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hgscale_cloud::{
    CloudClients, HealthStatus, InstanceDetails, InstanceState, set_termination_protection,
};
use hgscale_protocol::{
    InstanceId, ScaleDecision, TerminatedInstance, TerminationOutcome, TransientErrors,
};

use crate::config::TerminateConfig;
use crate::error::PipelineResult;

/// What to do with the group's unhealthy instances.
#[derive(Debug, Default, PartialEq, Eq)]
struct UnhealthyPlan {
    /// Detach right away.
    detach: Vec<InstanceId>,
    /// Stopped: terminate first, detach once terminated.
    terminate: Vec<InstanceDetails>,
}

impl UnhealthyPlan {
    fn marked(&self) -> HashSet<&str> {
        self.detach
            .iter()
            .map(String::as_str)
            .chain(self.terminate.iter().map(|i| i.instance_id.as_str()))
            .collect()
    }
}

pub async fn terminate(
    decision: &ScaleDecision,
    cloud: &CloudClients,
    group_name: &str,
    settings: &TerminateConfig,
) -> PipelineResult<TerminationOutcome> {
    terminate_at(decision, cloud, group_name, settings, Utc::now()).await
}

/// [`terminate`] with an explicit clock.
pub async fn terminate_at(
    decision: &ScaleDecision,
    cloud: &CloudClients,
    group_name: &str,
    settings: &TerminateConfig,
    now: DateTime<Utc>,
) -> PipelineResult<TerminationOutcome> {
    let mut errors = TransientErrors::new();
    errors.extend_from(&decision.transient_errors);

    let group = cloud.groups.describe_group(group_name).await?;

    let unhealthy = plan_unhealthy(cloud, &group.instances, &mut errors).await;
    let marked = unhealthy.marked();

    let members: HashSet<&str> = decision.hosts.iter().map(|h| h.instance_id.as_str()).collect();
    let delta: Vec<InstanceId> = group
        .instance_ids()
        .into_iter()
        .filter(|id| !members.contains(id.as_str()) && !marked.contains(id.as_str()))
        .collect();
    debug!(?delta, "instances no longer counted as cluster members");

    let described = if delta.is_empty() {
        Vec::new()
    } else {
        cloud.compute.describe_instances(&delta).await?
    };

    let old_enough = |instance: &InstanceDetails| {
        if decision.is_explicit_removal(&instance.instance_id)
            || now - instance.launch_time >= settings.min_age()
        {
            return true;
        }
        info!(
            instance_id = %instance.instance_id,
            launch_time = %instance.launch_time,
            "instance too young to terminate"
        );
        false
    };

    let mut candidates: Vec<InstanceDetails> = Vec::new();
    for instance in unhealthy.terminate.into_iter().chain(described) {
        if instance.state.is_terminal() {
            debug!(instance_id = %instance.instance_id, state = %instance.state, "already terminating");
            continue;
        }
        if old_enough(&instance) {
            candidates.push(instance);
        }
    }

    let mut terminated = Vec::new();
    for batch in candidates.chunks(settings.batch_size.max(1)) {
        terminated.extend(
            terminate_batch(cloud, group_name, batch, settings.protection_concurrency, &mut errors)
                .await,
        );
    }

    let mut to_detach = unhealthy.detach;
    to_detach.extend(terminated.iter().map(|t| t.instance_id.clone()));
    detach(cloud, group_name, &to_detach, settings.detach_batch_size, &mut errors).await;

    info!(
        terminated = terminated.len(),
        detached = to_detach.len(),
        transient_errors = errors.len(),
        "terminate finished"
    );

    Ok(TerminationOutcome {
        instances: terminated,
        transient_errors: errors,
    })
}

/// Sort unhealthy instances into detach-now and terminate-then-detach.
async fn plan_unhealthy(
    cloud: &CloudClients,
    instances: &[hgscale_cloud::GroupInstance],
    errors: &mut TransientErrors,
) -> UnhealthyPlan {
    let mut plan = UnhealthyPlan::default();

    for instance in instances
        .iter()
        .filter(|i| i.health_status == HealthStatus::Unhealthy)
    {
        let id = &instance.instance_id;
        if !instance.protected_from_scale_in {
            plan.detach.push(id.clone());
            continue;
        }

        match cloud.compute.describe_instances(std::slice::from_ref(id)).await {
            Err(e) => {
                warn!(instance_id = %id, error = %e, "failed to describe unhealthy instance");
                errors.push("describe-unhealthy", format!("{id}: {e}"));
            }
            Ok(found) => match found.into_iter().next() {
                None => {
                    debug!(instance_id = %id, "unhealthy instance not found");
                    plan.detach.push(id.clone());
                }
                Some(details) if details.state == InstanceState::Terminated => {
                    plan.detach.push(id.clone());
                }
                Some(details) if details.state == InstanceState::Stopped => {
                    plan.terminate.push(details);
                }
                Some(details) => {
                    debug!(instance_id = %id, state = %details.state, "unhealthy instance left alone");
                }
            },
        }
    }

    if !plan.detach.is_empty() || !plan.terminate.is_empty() {
        info!(
            detach = plan.detach.len(),
            terminate = plan.terminate.len(),
            "unhealthy instances"
        );
    }
    plan
}

/// Disable termination protection, clear scale-in protection and
/// terminate. Only instances whose protection was actually disabled go
/// any further.
async fn terminate_batch(
    cloud: &CloudClients,
    group_name: &str,
    batch: &[InstanceDetails],
    concurrency: usize,
    errors: &mut TransientErrors,
) -> Vec<TerminatedInstance> {
    let ids: Vec<InstanceId> = batch.iter().map(|i| i.instance_id.clone()).collect();
    let outcome = set_termination_protection(cloud.compute.clone(), &ids, false, concurrency).await;
    for (id, e) in &outcome.failed {
        errors.push("termination-protection", format!("{id}: {e}"));
    }

    let ready = outcome.updated;
    if ready.is_empty() {
        return Vec::new();
    }

    if let Err(e) = cloud
        .groups
        .set_scale_in_protection(group_name, &ready, false)
        .await
    {
        warn!(error = %e, count = ready.len(), "failed to clear scale-in protection");
        errors.push("scale-in-protection", e);
        return Vec::new();
    }

    if let Err(e) = cloud.compute.terminate_instances(&ready).await {
        warn!(error = %e, count = ready.len(), "failed to terminate instances");
        errors.push("terminate", e);
        return Vec::new();
    }

    let launch_times: HashMap<&str, DateTime<Utc>> = batch
        .iter()
        .map(|i| (i.instance_id.as_str(), i.launch_time))
        .collect();
    ready
        .iter()
        .filter_map(|id| {
            launch_times.get(id.as_str()).map(|t| TerminatedInstance {
                instance_id: id.clone(),
                launch_time: *t,
            })
        })
        .inspect(|t| info!(instance_id = %t.instance_id, "terminated instance"))
        .collect()
}

async fn detach(
    cloud: &CloudClients,
    group_name: &str,
    instance_ids: &[InstanceId],
    chunk_size: usize,
    errors: &mut TransientErrors,
) {
    for chunk in instance_ids.chunks(chunk_size.max(1)) {
        if let Err(e) = cloud.groups.detach_instances(group_name, chunk, false).await {
            warn!(error = %e, instances = ?chunk, "failed to detach instances");
            errors.push("detach", e);
        }
    }
}
