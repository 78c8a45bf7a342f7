//! Command handlers, one module per area.

pub mod keychain;
pub mod status;
pub mod tools;
pub mod transform;
pub mod unlock;
