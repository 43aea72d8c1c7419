// SPDX-License-Identifier: Apache-2.0

// Layered configuration for the session runtime and gateway.
mod loader;
mod schema;

pub use loader::load;
pub use schema::*;
