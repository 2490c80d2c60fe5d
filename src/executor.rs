use crate::error::HarvestError;
use crate::model::{derive_group_label, ContactBatch, HarvestFilters};
use crate::traits::{CollaboratorError, GroupHarvester};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, instrument};

/// Runs one target through the harvesting collaborator and normalizes the result.
///
/// The collaborator stands for a single automation session, so calls are
/// serialized behind a one-permit semaphore.
pub struct TargetProcessor {
    harvester: Arc<dyn GroupHarvester>,
    session: Arc<Semaphore>,
    call_timeout: Option<Duration>,
}

impl TargetProcessor {
    pub fn new(harvester: Arc<dyn GroupHarvester>) -> Self {
        Self {
            harvester,
            session: Arc::new(Semaphore::new(1)),
            call_timeout: None,
        }
    }

    /// Fails a harvest call that has not returned within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(source = self.harvester.source_id(), group = %target))]
    pub async fn process(
        &self,
        target: &str,
        filters: &HarvestFilters,
    ) -> Result<ContactBatch, HarvestError> {
        let failed = |cause: CollaboratorError| HarvestError::TargetProcessing {
            target: target.to_string(),
            cause,
        };

        let _permit = self.session.acquire().await.map_err(|e| {
            failed(CollaboratorError::Unavailable(format!(
                "Automation session closed: {}",
                e
            )))
        })?;

        info!("Starting harvest");

        let call = self.harvester.harvest(target, filters);
        let harvest = match self.call_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| failed(CollaboratorError::Timeout(limit.as_secs())))?,
            None => call.await,
        }
        .map_err(failed)?;

        if let Some(pos) = harvest.contacts.iter().position(|c| !c.is_identifiable()) {
            return Err(failed(CollaboratorError::Malformed(format!(
                "record {} has neither a name nor a phone",
                pos + 1
            ))));
        }

        let group_label = harvest
            .group_label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| derive_group_label(target));

        let contacts: Vec<_> = harvest
            .contacts
            .into_iter()
            .map(|raw| filters.apply(raw, &group_label))
            .collect();

        info!(contacts = contacts.len(), group = %group_label, "Finished harvest");

        Ok(ContactBatch {
            target: target.to_string(),
            group_label,
            contacts,
        })
    }
}
