//! Review orchestration: prompt → LLM → extraction → aggregation.
//!
//! Layered bottom-up:
//! - [`prompt`]   builds the prompt pair for one analysis unit.
//! - [`extract`]  recovers the findings array from raw model text.
//! - [`analyze`]  runs one file's hunks with bounded concurrency.
//! - [`runner`]   produces one `SkillReport` per skill.
//! - [`schedule`] runs the skill set with skill-level concurrency.
//! - [`events`]   is the typed progress channel all layers emit into.

pub mod analyze;
pub mod events;
pub mod extract;
pub mod prompt;
pub mod runner;
pub mod schedule;

pub use analyze::{AnalyzeOptions, FileAnalysis};
pub use events::{ProgressEvent, ProgressSink};
pub use runner::{RunnerOptions, RunnerOverrides, run_skill};
pub use schedule::{ScheduleOptions, SkillSource, SkillTask, SkillTaskResult, run_skills};
