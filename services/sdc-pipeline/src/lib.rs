//! SDC Pipeline
//!
//! File placement and notification service for a science data center.
//! Science files move through staged buckets (incoming, sorted, processed);
//! this crate decides where each file lives, moves it there, records every
//! move in an event ledger and keeps a chat channel threaded per file.
//!
//! ## Features
//!
//! - **Deterministic Storage Keys**: Keys are derived from filename metadata
//!   alone (`<level>/<year>/<month>[/<day>]/<filename>`)
//! - **Mode-Aware Placement**: Dry-run, fixture data and locally mounted
//!   deployments compute the same keys but never move bytes
//! - **Event Ledger**: Every upload, copy and move is written to Timestream
//!   with a fixed dimension schema
//! - **Threaded Notifications**: One root message per science file, every
//!   later event posted as a reply, with fixed-delay retries
//! - **Reprocessing**: Replays the S3 event for one object to the processing
//!   function
//!
//! ## Architecture
//!
//! ```text
//!  Filename                 S3 Buckets                 Timestream
//! ┌──────────────┐         ┌──────────────┐          ┌──────────────┐
//! │ Filename     │         │ incoming     │          │ sdc_aws_logs │
//! │ Parser       │         │ <mission>-   │          └──────────────┘
//! └──────────────┘         │  <inst>      │                 ▲
//!        │                 └──────────────┘                 │
//!        ▼                        ▲                         │
//! ┌──────────────┐         ┌──────────────┐          ┌──────────────┐
//! │ Key          │────────▶│ Placement    │─────────▶│ Event        │
//! │ Derivation   │         │ + Gateway    │          │ Ledger       │
//! └──────────────┘         └──────────────┘          └──────────────┘
//!                                 │
//!                                 ▼
//!                          ┌──────────────┐          ┌──────────────┐
//!                          │ Notifier     │─────────▶│ Slack        │
//!                          │ (correlator, │          │ channel      │
//!                          │  delivery)   │          └──────────────┘
//!                          └──────────────┘
//! ```

pub mod alert;
pub mod chat;
pub mod config;
pub mod correlator;
pub mod delivery;
pub mod keys;
pub mod ledger;
pub mod metadata;
pub mod notifier;
pub mod object_store;
pub mod placement;
pub mod report;
pub mod reprocess;
pub mod s3_store;
pub mod slack;
pub mod timestream;

#[cfg(test)]
mod testing;

pub use alert::{AlertType, FileMessage};
pub use chat::{ChatClient, ChatError};
pub use config::{Config, ConfigError, Environment};
pub use delivery::RetryPolicy;
pub use keys::{derive_key, KeyError, KeyLayout, StorageKey};
pub use ledger::{EventLedger, LedgerError, LedgerTarget, MetricsSink, PipelineAction, PipelineEvent};
pub use metadata::{FilenameParser, Fingerprint, ScienceFileMetadata, SwxsocFilenameParser};
pub use notifier::{Notifier, NotifyError};
pub use object_store::{ObjectGateway, ObjectStore, StoreError};
pub use placement::{Placement, PlacementError, TransferContext};
pub use report::{ReportError, Reporter};
pub use reprocess::{LambdaInvoker, ReprocessError, Reprocessor};
pub use s3_store::S3ObjectStore;
pub use slack::SlackClient;
pub use timestream::TimestreamSink;
