pub mod events;
pub mod poll;
pub mod status;
