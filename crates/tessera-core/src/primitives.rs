//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Tessera core.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Handlers, the dispatcher and the ingestion pipeline all read their
//! reserved names and limits from here.

/// Maximum number of handler frames active at once.
///
/// A dispatch made while this many frames are already on the stack fails
/// with `DispatchDepthExceeded`. This bounds accidental mutual recursion
/// between handlers.
pub const MAX_DISPATCH_DEPTH: usize = 10;

/// Maximum number of records accepted in a single push batch.
pub const MAX_BATCH_LENGTH: usize = 10000;

// =============================================================================
// RESERVED RECORD KEYS
// =============================================================================

/// Key naming the target type of a record or raw object.
pub const TYPE_KEY: &str = "type";

/// Key holding the backend-assigned identifier of a record.
pub const ID_KEY: &str = "id";

/// Batch-local correlation label.
///
/// A record carrying this key can be referenced by later records of the
/// same batch through a `{type, <id>}` placeholder.
pub const CORRELATION_KEY: &str = "<id>";

// =============================================================================
// NAMESPACES & BACKENDS
// =============================================================================

/// Namespace used when a caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace holding the configuration object and the internal manifest.
pub const INTERNAL_NAMESPACE: &str = "internal";

/// Backend used when a caller does not name one.
pub const DEFAULT_BACKEND: &str = "default";

/// Logical type every backend type descends from.
pub const BACKEND_BASE_TYPE: &str = "backend";

// =============================================================================
// OPERATIONS
// =============================================================================

pub const OP_MIGRATE: &str = "backend.migrate";
pub const OP_MIGRATE_INTERNAL: &str = "backend.migrate.internal";
pub const OP_PREPARE: &str = "backend.prepare";
pub const OP_PREPARE_INTERNAL: &str = "backend.prepare.internal";
pub const OP_MANIFEST_CHECK: &str = "manifest.check";
pub const OP_MANIFEST_LOAD: &str = "manifest.load";
pub const OP_SERIALIZE: &str = "serialize";
pub const OP_CHECK: &str = "check";
pub const OP_PUSH: &str = "push";
pub const OP_PULL: &str = "pull";

/// The closed set of operation names a handler may be registered for.
pub const OPERATIONS: &[&str] = &[
    OP_MIGRATE,
    OP_MIGRATE_INTERNAL,
    OP_PREPARE,
    OP_PREPARE_INTERNAL,
    OP_MANIFEST_CHECK,
    OP_MANIFEST_LOAD,
    OP_SERIALIZE,
    OP_CHECK,
    OP_PUSH,
    OP_PULL,
];

/// Check whether an operation name belongs to the allow-list.
#[must_use]
pub fn is_known_operation(name: &str) -> bool {
    OPERATIONS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_depth_is_ten() {
        assert_eq!(MAX_DISPATCH_DEPTH, 10);
    }

    #[test]
    fn allow_list_is_closed() {
        assert!(is_known_operation("push"));
        assert!(is_known_operation("backend.migrate.internal"));
        assert!(is_known_operation("pull"));
        assert!(!is_known_operation("wipe"));
        assert!(!is_known_operation(""));
    }
}
