pub mod types;
pub mod subject;
pub mod traits;
pub mod fetcher;
pub mod collector;
pub mod store;
pub mod aggregator;
pub mod ranking;
pub mod scheduler;
pub mod render;
pub mod pipeline;
pub mod sources;

pub use types::*;
pub use traits::{KeyValueStore, PageSource, RenderSink};
pub use fetcher::Fetcher;
pub use collector::SourceCollector;
pub use store::{MemoryStore, SqliteStore};
pub use aggregator::RatingAggregator;
pub use ranking::{rank_records, score_record, RankingComputer};
pub use scheduler::RefreshScheduler;
pub use render::{ConsoleRenderer, RenderOptions};
pub use pipeline::RatingsPipeline;
