pub mod list;
pub mod record_changes;

pub use list::{
    ListAuditTrailError, ListAuditTrailQuery, ListAuditTrailResponse, PaginationMetadata,
};
pub use record_changes::{RecordChangesError, RecordChangesQuery, RecordChangesResponse};
