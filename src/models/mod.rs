pub mod audio;
pub mod job;
pub mod usage;
pub mod user;

pub use audio::*;
pub use job::*;
pub use usage::*;
pub use user::*;
