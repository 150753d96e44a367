//! Soulframe limbic layer: per-identity mood, climate, bonding and the
//! background rhythms that run beside conversation turns.

pub mod bonding;
pub mod climate;
pub mod emotion;
pub mod tasks;

pub use bonding::BondTracker;
pub use climate::compute_climate;
pub use emotion::{BoardEntry, EmotionalStateManager, MoodBoard};
pub use tasks::{ActivityClock, AmbientLine, AmbientMutterer, TaskScheduler};
