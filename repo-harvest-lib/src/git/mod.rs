//! Ref and tree resolution over the git protocol.
//!
//! Both resolvers shell out to `git`, which talks to the hosting service without touching the
//! REST quota. Credentials are embedded in remote URLs and masked before anything is logged.

mod command;
mod refs;
mod tree;

pub(crate) const LOG_TARGET: &str = "       git";

pub use command::{mask_secret, remote_url};
pub use refs::{CachedRefSet, LsRemote, RefLister, RefLookup, RefResolver, Resolution, parse_ls_remote};
pub use tree::{BloblessFetch, TreeLister, TreeResolver};
