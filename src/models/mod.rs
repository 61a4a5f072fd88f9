// Domain types shared by the queue, the ledger and the build driver

pub mod flags;
pub mod failure;
pub mod task;
pub mod package;
pub mod attempt;
pub mod blacklist;

pub use failure::*;
pub use task::*;
pub use package::*;
pub use attempt::*;
pub use blacklist::*;
