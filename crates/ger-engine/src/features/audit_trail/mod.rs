pub mod queries;

pub use queries::{
    ListAuditTrailError, ListAuditTrailQuery, ListAuditTrailResponse, PaginationMetadata,
    RecordChangesError, RecordChangesQuery, RecordChangesResponse,
};
