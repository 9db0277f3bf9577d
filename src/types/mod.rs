// ABOUTME: Shared identifier types.
// ABOUTME: Exposes the ContainerId newtype.

mod id;

pub use id::ContainerId;
