// ============================================================================
// Statement Lifecycle
// ============================================================================
//
// Every statement and result set the engine opens goes through the
// StatementManager, which keeps the counts, the batch slot, and the
// handle registry consistent with what is actually open on the driver.
//
// ============================================================================

mod batch;
pub mod expectation;
pub mod inspector;
mod manager;
pub mod metrics;
mod registry;

pub use expectation::{EXECUTE_FAILED, Expectation, SUCCESS_NO_INFO};
pub use inspector::{IdentityInspector, StatementInspector};
pub use manager::StatementManager;
pub use metrics::{MetricsSnapshot, ResourceMetrics};
pub use registry::{ResultSetId, StatementId};
