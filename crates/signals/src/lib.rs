pub mod analyze;
pub mod feed;

pub use analyze::ChannelAnalyzer;
pub use feed::CsvFeed;
