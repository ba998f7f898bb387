// File: src/target.rs
//
// Flood Target
//
// Identity + stability flag for the resource under test. The stability flag
// is the only state mutated concurrently by worker threads: it is monotonic
// (STABLE -> UNSTABLE only) and idempotent to set, so an atomic bool is all
// the synchronization it needs.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The resource under test: a display name plus an observed-stability flag.
///
/// A `Target` starts STABLE. The first worker that observes an unhandled
/// failure from the resource marks it UNSTABLE; within one flood session the
/// flag never reverts. Every component reads it for logging and branching.
///
/// # Example
///
/// ```rust
/// use flood_harness::Target;
///
/// struct Counter;
///
/// let target = Target::of::<Counter>(Some("non-atomic"));
/// assert!(target.is_stable());
/// assert!(target.name().contains("Counter"));
///
/// target.mark_unstable();
/// target.mark_unstable(); // idempotent
/// assert!(target.is_unstable());
/// ```
#[derive(Debug)]
pub struct Target {
    /// Display name (type identifier, optionally suffixed with a human tag)
    name: String,

    /// STABLE (false) until a worker observes an unhandled failure
    unstable: AtomicBool,
}

impl Target {
    /// Create a target named after the resource type `C`, with an optional
    /// human-readable tag appended for disambiguation.
    pub fn of<C>(tag: Option<&str>) -> Self {
        let type_name = std::any::type_name::<C>();
        // Strip module path; tests read these names in logs and result maps.
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::named(short, tag)
    }

    /// Create a target with an explicit name and optional tag.
    pub fn named(name: &str, tag: Option<&str>) -> Self {
        let name = match tag {
            Some(tag) => format!("{}[{}]", name, tag),
            None => name.to_string(),
        };
        Self {
            name,
            unstable: AtomicBool::new(false),
        }
    }

    /// Display name of the resource under test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once any worker has observed an unhandled failure.
    pub fn is_unstable(&self) -> bool {
        self.unstable.load(Ordering::Acquire)
    }

    /// True while no worker has observed an unhandled failure.
    pub fn is_stable(&self) -> bool {
        !self.is_unstable()
    }

    /// Record that the resource failed under flooding.
    ///
    /// Monotonic and idempotent; the STABLE -> UNSTABLE transition is logged
    /// exactly once no matter how many workers report it.
    pub fn mark_unstable(&self) {
        if self
            .unstable
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::warn!("target '{}' became UNSTABLE", self.name);
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            if self.is_unstable() { "UNSTABLE" } else { "STABLE" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Counter;

    #[test]
    fn test_name_from_type_and_tag() {
        let target = Target::of::<Counter>(None);
        assert_eq!(target.name(), "Counter");

        let tagged = Target::of::<Counter>(Some("atomic"));
        assert_eq!(tagged.name(), "Counter[atomic]");
    }

    #[test]
    fn test_stability_is_monotonic() {
        let target = Target::named("Resource", None);
        assert!(target.is_stable());

        target.mark_unstable();
        assert!(target.is_unstable());

        // Repeated marks keep it unstable
        target.mark_unstable();
        assert!(target.is_unstable());
        assert!(!target.is_stable());
    }

    #[test]
    fn test_concurrent_marking() {
        let target = Arc::new(Target::named("Shared", None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let target = Arc::clone(&target);
                std::thread::spawn(move || target.mark_unstable())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(target.is_unstable());
    }

    #[test]
    fn test_display() {
        let target = Target::named("Thing", Some("v2"));
        assert_eq!(format!("{}", target), "Thing[v2] (STABLE)");
        target.mark_unstable();
        assert_eq!(format!("{}", target), "Thing[v2] (UNSTABLE)");
    }
}
