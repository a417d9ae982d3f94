pub mod data_store;
pub mod format;
pub mod projection;
pub mod selection;
pub mod series_cache;
