//! Edit-log records (§3 "mesh_update"): the diff a boolean/filter pass
//! leaves behind so a caller can replay the same edit against a
//! secondary representation (render mesh, physics proxy, ...) without
//! re-running the geometric algorithm.

/// A vertex introduced by an edit, recording which input vertex (if
/// any) and which pair of source triangles produced it — a contour
/// intersection vertex has both `source_tri_a`/`source_tri_b` set, a
/// plain carried-over vertex has neither.
#[derive(Clone, Debug)]
pub struct NewVertex {
    pub idx: u32,
    pub source_b_vtx: Option<u32>,
    pub source_tri_a: Option<u32>,
    pub source_tri_b: Option<u32>,
}

/// A triangle introduced by an edit. `barycentric_area` rows are the
/// fractional coverage of `idx_org`'s three corners used to form each
/// of this triangle's vertices, used by the caller to interpolate
/// per-vertex attributes (UVs, skin weights) without re-deriving them
/// geometrically.
#[derive(Clone, Debug)]
pub struct NewTriangle {
    pub idx_new: u32,
    pub idx_org: u32,
    pub iop: i32,
    pub barycentric_area: [[f64; 3]; 3],
    pub area_org: f64,
    pub vertex_refs: [u32; 3],
}

#[derive(Clone, Debug, Default)]
pub struct WeldedVertex {
    pub from: u32,
    pub to: u32,
}

#[derive(Clone, Debug, Default)]
pub struct TJunctionFix {
    pub tri: u32,
    pub edge: u8,
    pub inserted_vtx: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MovedBox {
    pub node: u32,
}

/// One edit batch. Mirrors the original `mesh_update` record: rather
/// than emitting a full rebuilt mesh, an edit enumerates exactly what
/// changed so a secondary (e.g. render) copy of the mesh can be kept
/// in sync incrementally.
#[derive(Clone, Debug, Default)]
pub struct MeshUpdate {
    pub removed_vtx: Vec<u32>,
    pub removed_tri: Vec<u32>,
    pub new_vtx: Vec<NewVertex>,
    pub new_tri: Vec<NewTriangle>,
    pub welded_vtx: Vec<WeldedVertex>,
    pub tj_fixes: Vec<TJunctionFix>,
    pub moved_boxes: Vec<MovedBox>,
}

impl MeshUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.removed_vtx.is_empty()
            && self.removed_tri.is_empty()
            && self.new_vtx.is_empty()
            && self.new_tri.is_empty()
            && self.welded_vtx.is_empty()
            && self.tj_fixes.is_empty()
            && self.moved_boxes.is_empty()
    }
}

/// Secondary edit-log chain: a doubly-linked list of `MeshUpdate`s
/// threaded onto the "B" mesh of a boolean operation, so a caller
/// holding only a reference to B can still walk every edit applied to
/// it across a chain of operations.
#[derive(Default)]
pub struct EditLogChain {
    entries: Vec<MeshUpdate>,
    prev: Vec<i32>,
    next: Vec<i32>,
    tail: i32,
}

impl EditLogChain {
    pub fn new() -> Self {
        Self { entries: Vec::new(), prev: Vec::new(), next: Vec::new(), tail: -1 }
    }

    pub fn push(&mut self, update: MeshUpdate) -> usize {
        let idx = self.entries.len();
        self.entries.push(update);
        self.prev.push(self.tail);
        self.next.push(-1);
        if self.tail >= 0 {
            self.next[self.tail as usize] = idx as i32;
        }
        self.tail = idx as i32;
        idx
    }

    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = &MeshUpdate> {
        let mut cur = start as i32;
        std::iter::from_fn(move || {
            if cur < 0 {
                return None;
            }
            let entry = &self.entries[cur as usize];
            cur = self.next[cur as usize];
            Some(entry)
        })
    }

    pub fn last(&self) -> Option<&MeshUpdate> {
        if self.tail < 0 {
            None
        } else {
            Some(&self.entries[self.tail as usize])
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_walks_in_insertion_order() {
        let mut chain = EditLogChain::new();
        let mut a = MeshUpdate::new();
        a.removed_tri.push(1);
        let mut b = MeshUpdate::new();
        b.removed_tri.push(2);
        let i0 = chain.push(a);
        chain.push(b);
        let collected: Vec<u32> = chain.iter_from(i0).flat_map(|u| u.removed_tri.clone()).collect();
        assert_eq!(collected, vec![1, 2]);
    }

    #[test]
    fn empty_update_reports_empty() {
        assert!(MeshUpdate::new().is_empty());
    }
}
