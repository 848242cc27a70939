//! Database models split into domain-specific modules.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod common;
pub mod order;
pub mod profile;
pub mod report;
pub mod token;
pub mod user;

pub use address::*;
pub use cart::*;
pub use catalog::*;
pub use common::*;
pub use order::*;
pub use profile::*;
pub use report::*;
pub use token::*;
pub use user::*;
