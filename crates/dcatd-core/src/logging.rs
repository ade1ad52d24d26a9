//! Values of the `subsystem` field on dcatd log events.
//!
//! Every `tracing` event carries `subsystem` and, inside larger subsystems,
//! a `component`:
//!
//! | Subsystem | Components | Emits |
//! |-----------|------------|-------|
//! | `api` | `collection`, `harvest`, `health` | startup, rejected requests, aborted response streams |
//! | `core` | `controller` | conditional writes and their outcome |
//! | `hooks` | `registry` | plugin table, lifecycle, backend timeouts |
//! | `database` | `pool`, `datasets`, `memory`, `query` | connection retries, storage writes, scans |
//! | `search` | `engine` | result counts and facet tallies |
//!
//! Entity fields use plain names: `dataset_id`, `etag`, `hook`, `op`.

pub const SUBSYSTEM_API: &str = "api";
pub const SUBSYSTEM_CORE: &str = "core";
pub const SUBSYSTEM_HOOKS: &str = "hooks";
pub const SUBSYSTEM_DATABASE: &str = "database";
pub const SUBSYSTEM_SEARCH: &str = "search";
