pub mod task;
pub mod package;
pub mod attempt;
pub mod builder;
pub mod blacklist;

pub use task::*;
pub use package::*;
pub use attempt::*;
pub use builder::*;
pub use blacklist::*;
