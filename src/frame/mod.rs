pub mod frame;
pub mod media;
