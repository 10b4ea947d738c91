mod kv;
pub use kv::KeyValue;

mod env;
pub use env::EnvVars;

mod batch_id;
pub use batch_id::BatchId;

mod stage;
pub use stage::Stage;

mod role;
pub use role::{JobHandle, JobRole};

mod batch_record;
pub use batch_record::{BatchRecord, StageCompletion};

mod action;
pub use action::{BatchEvent, BroadcastAction};

mod error_kind;
pub use error_kind::ErrorKind;

pub mod workload;
pub use workload::{SpecError, WorkloadSpec, WorkloadSpecBuilder};

mod millis;

/// Reference to an input or output artifact (object-store URL or relative path).
pub type FileRef = String;

/// Duration value in milliseconds.
///
/// Used in configuration structs where an explicit time limit is required.
pub type DurationMs = u64;
