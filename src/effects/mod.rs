pub mod filter;
pub mod transition;
