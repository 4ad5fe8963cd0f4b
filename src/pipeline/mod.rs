//! Media generation pipeline.
//!
//! Two single-pass tasks, speech generation and audio/video merge, run by a
//! pool of queue workers. Tasks receive their collaborators through
//! [`Services`] and touch the record only after their upload succeeded.

pub mod generate;
pub mod merge;
pub mod queue;
pub mod services;
pub mod task;
pub mod workspace;

pub use generate::GenerateSpeechTask;
pub use merge::MergeAudioVideoTask;
pub use queue::{QueueHandle, WorkQueue, run_event};
pub use services::{Services, TaskSettings};
pub use task::{Action, TaskReport, TaskState, TriggerEvent, TriggerRejection};
pub use workspace::TaskWorkspace;
