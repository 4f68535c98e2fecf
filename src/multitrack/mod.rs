pub mod multitrack;
