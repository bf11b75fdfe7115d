pub mod diff;
pub mod init;
pub mod list;
pub mod synth;
pub mod validate;
