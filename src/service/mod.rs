pub mod analysis;
pub mod caching;
pub mod calendar;
pub mod enrichment;
pub mod finance;
pub mod news;
pub mod storage;
