pub mod channel;
pub mod feed;
pub mod merge;
pub mod redis_feed;
