// ============================================================================
// lumen - Child Keys
// Identity of siblings across renders
// ============================================================================

use crate::tree::VNode;
use std::collections::HashMap;

/// Reconciliation identity of one child among its siblings.
///
/// An explicit key wins. Without one, identity derives from the node's kind
/// and name plus its occurrence index among same-shaped unkeyed siblings, so
/// inserting an unrelated sibling does not shift every derived key. Derived
/// identity is undefined under reordering: a list whose order can change
/// must carry explicit keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildKey {
    Explicit(String),
    Derived {
        kind: &'static str,
        name: Option<String>,
        occurrence: usize,
    },
}

impl ChildKey {
    pub fn is_explicit(&self) -> bool {
        matches!(self, ChildKey::Explicit(_))
    }
}

/// Compute the keys of a sibling list, one per child, in order.
pub fn child_keys(children: &[VNode]) -> Vec<ChildKey> {
    let mut occurrences: HashMap<(&'static str, Option<String>), usize> = HashMap::new();
    children
        .iter()
        .map(|child| match child.key() {
            Some(key) => ChildKey::Explicit(key.to_string()),
            None => {
                let shape = (child.kind_name(), child.type_name().map(str::to_string));
                let slot = occurrences.entry(shape.clone()).or_insert(0);
                let occurrence = *slot;
                *slot += 1;
                ChildKey::Derived {
                    kind: shape.0,
                    name: shape.1,
                    occurrence,
                }
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
