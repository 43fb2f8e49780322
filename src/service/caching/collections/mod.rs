pub mod analysis;
pub mod calendar;
pub mod highlights;
pub mod market_caps;
pub mod news;
pub mod sparkline;
