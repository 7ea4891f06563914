//! Shell-owned context shared between views.

mod activation;

pub use activation::{ActivationOrder, ViewId};
