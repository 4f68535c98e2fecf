pub mod bag;
pub mod events;
