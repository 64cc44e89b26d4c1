// Source checkout: group a job's sources by type and hand each group to the
// matching Source plugin in one call.

use jobrunner_common::{CapabilityRegistry, JobError};
use jobrunner_sdk::{Context, Notifier, SourceDescriptor, Transport};

/// Group `sources` by their `type`, keeping the order in which each type was
/// first seen and the order of sources within a group.
pub fn group_sources(sources: &[SourceDescriptor]) -> Result<Vec<(String, Vec<SourceDescriptor>)>, JobError> {
    let mut groups: Vec<(String, Vec<SourceDescriptor>)> = Vec::new();
    for (index, source) in sources.iter().enumerate() {
        let kind = source.kind.trim();
        if kind.is_empty() {
            return Err(JobError::deserialization(
                format!("source #{}", index + 1),
                anyhow::anyhow!("source type must not be empty"),
            ));
        }

        match groups.iter_mut().find(|(k, _)| k == kind) {
            Some((_, group)) => group.push(source.clone()),
            None => groups.push((kind.to_string(), vec![source.clone()])),
        }
    }
    Ok(groups)
}

/// Check out every source. Stops at the first group that fails.
pub async fn checkout_sources(
    registry: &CapabilityRegistry,
    transport: &dyn Transport,
    context: &Context,
    sources: &[SourceDescriptor],
    notifier: &dyn Notifier,
) -> Result<(), JobError> {
    for (kind, group) in group_sources(sources)? {
        let source = registry.source(&kind)?;
        notifier.write(&format!("Checking out {} '{}' source(s)", group.len(), kind));

        match source.checkout(transport, context, &group).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(JobError::SourceCheckout {
                    kind,
                    source: anyhow::anyhow!("source plugin reported failure"),
                })
            }
            Err(e) => return Err(JobError::SourceCheckout { kind, source: e }),
        }
    }
    Ok(())
}
