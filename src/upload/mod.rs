// # Upload Module
//
// Batch upload pipeline with focused, testable components:
//
// - **transcode** (crate-level): images re-encoded and capped before transfer
// - **Strategy**: size-based routing between the direct and routed paths
// - **ObjectTransport**: the two transfer paths behind one trait
// - **BatchProgressTracker**: per-file ticks folded into one aggregate bar
// - **BatchConfirmer**: one consolidated save call per batch
// - **UploadService**: worker loop orchestrating the whole thing
//
// Public API:
// - `UploadService`: create and start the service
// - `UploadHandle`: submit batches and subscribe to events
// - `BatchRequest` / `UploadEvent`: requests in, progress and outcomes out

pub mod confirm;
pub mod progress;
pub mod service;
pub mod strategy;
pub mod transport;
pub mod types;

pub use confirm::{BatchConfirmer, ConfirmError, SaveEndpoint};
pub use progress::{overall_percent, BatchProgressTracker};
pub use service::{BatchError, UploadConfig, UploadHandle, UploadService};
pub use strategy::{select_strategy, Strategy};
pub use transport::{
    DirectTransport, ObjectTransport, ProgressFn, RoutedTransport, TransferContext,
    TransferError, TransportRouter,
};
pub use types::{BatchRequest, UploadEvent, UploadFile};
