//! Phases 11 and 12: transitive closure and hierarchy depths.
//!
//! The closure walk is an iterative depth-first traversal with a pending
//! sentinel for cycle detection; the recursion is unrolled onto an explicit
//! stack so a pathologically deep hierarchy cannot overflow the call stack.
//! Depths are a breadth-first sweep from the active roots.

use std::collections::{BTreeSet, VecDeque};

use crate::error::{Result, SnomedError};
use crate::SctId;
use crate::store::{LEAF_SENTINEL, PENDING_SENTINEL};

use super::{CANCEL_STRIDE, Import};

/// Direct children of a concept: sources of its inbound active defining
/// is-a relationships.
fn children_of(import: &Import<'_>, offset: u32) -> Vec<u32> {
    let inbounds = import.refs.read(import.concepts.inbounds(offset));
    let mut children = Vec::new();
    for rel in inbounds.iter() {
        if import.relationships.is_active(rel)
            && import.relationships.is_defining(rel)
            && import.relationships.rel_type(rel) == import.is_a_offset
        {
            children.push(import.relationships.source(rel));
        }
    }
    children
}

enum Frame {
    Enter(u32),
    Exit(u32),
}

/// Phase 11: `all_desc(c)` = sorted dedup union of child ∪ all_desc(child).
pub(crate) fn build_closure(import: &mut Import<'_>) -> Result<()> {
    let count = import.concepts.count();
    let mut processed = 0usize;
    for i in 0..count {
        let root = import.concepts.offset_of_nth(i);
        if import.concepts.all_desc(root) != 0 {
            continue;
        }
        let mut stack = vec![Frame::Enter(root)];
        while let Some(frame) = stack.pop() {
            processed += 1;
            if processed % CANCEL_STRIDE == 0 {
                import.cancel.check("build closure")?;
            }
            match frame {
                Frame::Enter(offset) => {
                    if import.concepts.all_desc(offset) != 0 {
                        continue;
                    }
                    import.concepts.set_all_desc(offset, PENDING_SENTINEL);
                    stack.push(Frame::Exit(offset));
                    for child in children_of(import, offset) {
                        match import.concepts.all_desc(child) {
                            PENDING_SENTINEL => {
                                return Err(SnomedError::CycleDetected {
                                    id: import.concepts.id(child),
                                });
                            }
                            0 => stack.push(Frame::Enter(child)),
                            _ => {}
                        }
                    }
                }
                Frame::Exit(offset) => {
                    let mut all: BTreeSet<u32> = BTreeSet::new();
                    for child in children_of(import, offset) {
                        all.insert(child);
                        let child_desc = import.concepts.all_desc(child);
                        if child_desc != LEAF_SENTINEL {
                            all.extend(import.refs.read(child_desc).iter());
                        }
                    }
                    if all.is_empty() {
                        import.concepts.set_all_desc(offset, LEAF_SENTINEL);
                    } else {
                        let sorted: Vec<u32> = all.into_iter().collect();
                        let refs = import.refs.add(&sorted);
                        import.concepts.set_all_desc(offset, refs);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Phase 12: breadth-first depth assignment from the active roots.
/// Roots get depth 0; every other reachable concept gets one more than its
/// shallowest active parent. Depth 256 is fatal.
pub(crate) fn set_depths(import: &mut Import<'_>) -> Result<()> {
    let count = import.concepts.count() as usize;
    let mut depths: Vec<u16> = vec![u16::MAX; count];
    let mut queue: VecDeque<u32> = VecDeque::new();

    let roots: Vec<SctId> = import.active_roots.clone();
    for id in roots {
        if let Some(offset) = import.concepts.find(id) {
            depths[Import::position_of(offset)] = 0;
            queue.push_back(offset);
        }
    }

    let mut visited = 0usize;
    while let Some(offset) = queue.pop_front() {
        visited += 1;
        if visited % CANCEL_STRIDE == 0 {
            import.cancel.check("set depths")?;
        }
        let next = depths[Import::position_of(offset)] + 1;
        for child in children_of(import, offset) {
            let at = Import::position_of(child);
            if next < depths[at] {
                if next > 255 {
                    return Err(SnomedError::DepthOverflow {
                        id: import.concepts.id(child),
                    });
                }
                depths[at] = next;
                queue.push_back(child);
            }
        }
    }

    for i in 0..count {
        let offset = import.concepts.offset_of_nth(i as u32);
        let depth = depths[i];
        // Concepts unreachable from an active root keep depth 0.
        import
            .concepts
            .set_depth(offset, if depth == u16::MAX { 0 } else { depth as u8 });
    }
    Ok(())
}
