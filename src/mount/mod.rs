mod events;
mod executor;
mod helper;
mod jobs;
pub mod mock;
mod option_string;
mod orchestrator;
mod reconciler;
mod remount;
mod table;
mod wol;

pub use events::{EventBus, OperationKind, ShareEvent};
pub use executor::MountExecutor;
pub use helper::{
    CancelSignal, HelperOutput, MountFailureKind, MountHelper, ProcessMountHelper,
    classify_mount_failure, get_mount_helper, wait_cancelled,
};
pub use jobs::{JobKey, JobOutcome, JobRegistry, JobResult, JobState, MountJob};
pub use option_string::{
    BsdOptionStringBuilder, LinuxOptionStringBuilder, OptionStringBuilder, option_builder_for,
};
pub use orchestrator::{MountOrchestrator, current_process_owner};
pub use reconciler::{Reconciler, ShareRegistry};
pub use remount::{RemountPlan, RemountPolicy};
pub use table::{ObservedMount, ProbeResult, parse_mount_table, probe_mount_point, read_mount_table};
pub use wol::send_magic_packet;
