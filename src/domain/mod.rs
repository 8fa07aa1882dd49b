//! Domain layer: content records, addressing, synthesis and policies.

pub mod entities;
pub mod policy;
pub mod resources;
pub mod synthesis;
