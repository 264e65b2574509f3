pub mod perceptual;

pub use perceptual::{difference_hash, hamming_distance};
