pub mod fixtures;
pub mod temp;
