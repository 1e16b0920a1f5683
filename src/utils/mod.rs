pub mod command;
pub mod file;
pub mod readlength;
pub mod streams;
pub mod system;
