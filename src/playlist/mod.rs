pub mod edit;
pub mod mix;
pub mod playlist;
