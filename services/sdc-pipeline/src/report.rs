//! Follow-up after a completed transfer: ledger record, then announcement.

use crate::alert::AlertType;
use crate::ledger::{EventLedger, LedgerError, PipelineEvent};
use crate::notifier::{Notifier, NotifyError};
use thiserror::Error;
use tracing::{debug, error};

/// What went wrong while reporting a transfer that already happened
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("ledger write failed: {0}")]
    Ledger(#[source] LedgerError),

    #[error("notification failed: {0}")]
    Notify(#[source] NotifyError),

    #[error("ledger write failed: {ledger}; notification failed: {notify}")]
    Both {
        ledger: LedgerError,
        notify: NotifyError,
    },
}

/// Records and announces transfers. Either half may be switched off.
pub struct Reporter {
    ledger: Option<EventLedger>,
    notifier: Option<Notifier>,
}

impl Reporter {
    pub fn new(ledger: Option<EventLedger>, notifier: Option<Notifier>) -> Self {
        Self { ledger, notifier }
    }

    pub fn notifier(&self) -> Option<&Notifier> {
        self.notifier.as_ref()
    }

    /// Record `event` and, when `announce` is given, post it to the file's
    /// thread. Both steps are attempted even if the first fails.
    pub async fn transfer_completed(
        &self,
        event: &PipelineEvent,
        announce: Option<(&str, AlertType)>,
    ) -> Result<(), ReportError> {
        let ledger = match self.ledger {
            Some(ref ledger) => ledger.record(event).await.err(),
            None => {
                debug!("Event ledger disabled, not recording");
                None
            }
        };
        if let Some(ref e) = ledger {
            error!(error = %e, file_key = %event.file_key, "Failed to record pipeline event");
        }

        let notify = match (announce, &self.notifier) {
            (Some((path, alert)), Some(notifier)) => {
                notifier.notify_pipeline_event(path, Some(alert)).await.err()
            }
            (Some(_), None) => {
                debug!("Notifications disabled, not announcing");
                None
            }
            (None, _) => None,
        };

        match (ledger, notify) {
            (None, None) => Ok(()),
            (Some(ledger), None) => Err(ReportError::Ledger(ledger)),
            (None, Some(notify)) => Err(ReportError::Notify(notify)),
            (Some(ledger), Some(notify)) => Err(ReportError::Both { ledger, notify }),
        }
    }
}
