pub mod commands;

pub use commands::{
    RecordCreateCommand, RecordCreateError, RecordCreateResponse,
    RecordDeleteCommand, RecordDeleteError, RecordDeleteResponse,
    RecordUpdateCommand, RecordUpdateError, RecordUpdateResponse,
};
