pub mod record_create;
pub mod record_delete;
pub mod record_update;

pub use record_create::{RecordCreateCommand, RecordCreateError, RecordCreateResponse};
pub use record_delete::{RecordDeleteCommand, RecordDeleteError, RecordDeleteResponse};
pub use record_update::{RecordUpdateCommand, RecordUpdateError, RecordUpdateResponse};
