// Test Helpers Module - Scripted Warehouse Infrastructure
//
// Provides an in-memory `ConnectionBackend` whose endpoints can be switched
// up and down at runtime, so failover and failback can be exercised without
// a real database. Used by the crate's own tests and available to consumers
// that want to test their query layer against a failing warehouse.

pub mod scripted_backend;

pub use scripted_backend::{test_registry, test_settings, ScriptedBackend, ScriptedHandle};
