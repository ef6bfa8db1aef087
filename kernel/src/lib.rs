// tfrego Kernel
//
// Normalizes configuration trees, infers schemas from samples and
// bridges resource data into Rego rule evaluation.

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod enumerate;
pub mod normalize;
pub mod rules;
pub mod schema;
pub mod tree;
pub mod value;
