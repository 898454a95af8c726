#[cfg(feature = "text_generation")]
pub mod text_generation;
