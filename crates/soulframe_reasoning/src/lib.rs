pub mod assembly;
pub mod finalizer;
pub mod loop_detector;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod shaping;
pub mod softener;
pub mod stages;

pub use assembly::Soulframe;
pub use finalizer::{FinalReply, TurnResultFinalizer};
pub use loop_detector::LoopInterruptionDetector;
pub use orchestrator::{TurnOrchestrator, TurnRequest};
pub use shaping::{is_well_formed, ResponsePostProcessor};
pub use softener::{FailureClass, FallbackSoftener};
pub use stages::{Capabilities, StageRunner};
