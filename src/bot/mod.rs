pub mod broadcaster;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod scheduler;

pub use broadcaster::{Broadcaster, StreamEvent};
pub use metrics::{CycleMetrics, CycleSummary};
pub use orchestrator::{CycleSettings, SpotArbitrageBot};
pub use persistence::PersistenceWriter;
pub use scheduler::{scheduler_channel, CycleState, SchedulerControl, SchedulerHandle, TriggerOutcome};
