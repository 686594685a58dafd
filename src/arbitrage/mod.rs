pub mod fees;
pub mod ranker;
pub mod spread;
pub mod universe;

pub use fees::FeeEnricher;
pub use ranker::{RankedSnapshot, Ranker, SnapshotHandle};
pub use spread::SpreadAnalyzer;
pub use universe::{UniverseBuilder, UniverseEntry};
