pub mod process;
pub mod sign;
pub mod verify;
