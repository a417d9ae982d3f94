pub mod instrument;
pub mod series;
pub mod settings;
pub mod sort;
pub mod status;
