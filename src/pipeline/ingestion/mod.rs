// Pipeline ingestion: reading the input file into a raw table

pub mod loader;

pub use loader::load_table;
