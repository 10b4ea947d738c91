use tracing::{debug, error, info, warn};

use cadflow_model::{BatchEvent, ErrorKind};

/// Human-readable message for an action type.
pub fn message_for(action_type: &str) -> &'static str {
    match action_type {
        "batch.started" => "batch started",
        "batch.advanced" => "batch advanced",
        "batch.completed" => "batch completed",
        "batch.failed" => "batch failed",
        "batch.timed_out" => "batch timed out",
        "batch.ignored" => "stale stage notification ignored",
        _ => "unknown batch action",
    }
}

/// Emit one structured log line for `event`.
///
/// Failures reported by jobs are warnings; infrastructure failures are errors.
pub fn log_event(event: &BatchEvent) {
    let msg = message_for(event.action_type());
    match event {
        BatchEvent::Started {
            batch_id,
            source_file_ref,
            job,
        } => info!(batch_id = %batch_id, source = %source_file_ref, job = %job, "{msg}"),
        BatchEvent::Advanced {
            batch_id,
            from,
            to,
            output_refs,
            job,
        } => info!(
            batch_id = %batch_id,
            %from,
            %to,
            outputs = output_refs.len(),
            job = %job,
            "{msg}"
        ),
        BatchEvent::Completed {
            batch_id,
            output_refs,
        } => info!(batch_id = %batch_id, outputs = ?output_refs, "{msg}"),
        BatchEvent::Failed {
            batch_id,
            stage,
            kind: kind @ ErrorKind::Reported,
            reason,
        } => warn!(batch_id = %batch_id, %stage, %kind, %reason, "{msg}"),
        BatchEvent::Failed {
            batch_id,
            stage,
            kind,
            reason,
        } => error!(batch_id = %batch_id, %stage, %kind, %reason, "{msg}"),
        BatchEvent::TimedOut {
            batch_id, stage, ..
        } => warn!(batch_id = %batch_id, %stage, "{msg}"),
        BatchEvent::Ignored {
            batch_id,
            reported,
            current,
        } => debug!(batch_id = %batch_id, %reported, %current, "{msg}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_action_type_has_its_own_message() {
        let types = [
            "batch.started",
            "batch.advanced",
            "batch.completed",
            "batch.failed",
            "batch.timed_out",
            "batch.ignored",
        ];
        let messages: HashSet<_> = types.iter().map(|t| message_for(t)).collect();
        assert_eq!(messages.len(), types.len());
        assert!(!messages.contains(message_for("batch.unknown")));
    }
}
