// tests/property.rs
//
// Cargo only auto-discovers direct children of `tests/` as integration test
// binaries; this thin root pulls in the scenario modules under
// `tests/property/`.

#[path = "property/scheduler.rs"]
mod scheduler;
