// Pipeline processing: row filtering, coercion and renaming

pub mod normalize;

pub use normalize::{NormalizeStats, Normalizer};
