//! Transient stage: turn accumulated soft failures into the run's verdict.

use tracing::{info, warn};

use hgscale_protocol::TerminationOutcome;

use crate::error::{PipelineError, PipelineResult};

pub fn check(outcome: &TerminationOutcome) -> PipelineResult<()> {
    match outcome.transient_errors.aggregate() {
        Some(message) => {
            warn!(count = outcome.transient_errors.len(), "run finished with transient errors");
            Err(PipelineError::Transient(message))
        }
        None => {
            info!("run finished cleanly");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgscale_protocol::TransientErrors;

    #[test]
    fn empty_list_succeeds() {
        assert!(check(&TerminationOutcome::default()).is_ok());
    }

    #[test]
    fn errors_are_newline_joined() {
        let outcome = TerminationOutcome {
            instances: vec![],
            transient_errors: TransientErrors::from(vec![
                "remove-host: HostId<1>: refused".to_string(),
                "terminate: throttled".to_string(),
            ]),
        };

        let err = check(&outcome).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "the following errors were found:\nremove-host: HostId<1>: refused\nterminate: throttled"
        );
    }
}
