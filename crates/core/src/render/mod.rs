use std::collections::HashMap;

use crate::ids::EntryId;
use crate::pool::RepresentationHandle;
use crate::{Result, TimelineError};

#[derive(Debug, Clone)]
struct RenderNode {
    entry: EntryId,
    parent: Option<RepresentationHandle>,
    children: Vec<RepresentationHandle>,
    depth: f64,
}

/// Retained attachment tree for pooled representations. Nodes only track
/// structure and depth; drawing itself happens in the host.
#[derive(Debug, Default)]
pub struct RenderTree {
    nodes: HashMap<RepresentationHandle, RenderNode>,
    roots: Vec<RepresentationHandle>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_attached(&self, handle: RepresentationHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn parent(&self, handle: RepresentationHandle) -> Option<RepresentationHandle> {
        self.nodes.get(&handle)?.parent
    }

    pub fn children(&self, handle: RepresentationHandle) -> &[RepresentationHandle] {
        self.nodes
            .get(&handle)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn attach(
        &mut self,
        handle: RepresentationHandle,
        entry: EntryId,
        parent: Option<RepresentationHandle>,
        depth: f64,
    ) -> Result<()> {
        if let Some(existing) = self.nodes.get(&handle) {
            return Err(TimelineError::AlreadyAttached(existing.entry));
        }

        match parent {
            Some(parent) => {
                let parent_node = self
                    .nodes
                    .get_mut(&parent)
                    .ok_or(TimelineError::InvalidHandle(parent))?;
                parent_node.children.push(handle);
            }
            None => self.roots.push(handle),
        }

        self.nodes.insert(
            handle,
            RenderNode {
                entry,
                parent,
                children: Vec::new(),
                depth,
            },
        );
        Ok(())
    }

    /// Detaches a leaf node. Children have to be detached first.
    pub fn detach(&mut self, handle: RepresentationHandle, entry: EntryId) -> Result<()> {
        let node = self
            .nodes
            .get(&handle)
            .ok_or(TimelineError::NotAttached(entry))?;
        if node.entry != entry {
            return Err(TimelineError::NotAttached(entry));
        }
        if !node.children.is_empty() {
            return Err(TimelineError::HasAttachedChildren(handle));
        }

        let parent = node.parent;
        self.nodes.remove(&handle);
        match parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            Some(parent_node) => parent_node.children.retain(|child| *child != handle),
            None => self.roots.retain(|root| *root != handle),
        }
        Ok(())
    }

    pub fn set_depth(&mut self, handle: RepresentationHandle, depth: f64) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.depth = depth;
        }
    }

    /// Root nodes back to front: later objects (greater depth) are drawn first
    /// so earlier ones end up on top.
    pub fn draw_order(&self) -> Vec<RepresentationHandle> {
        let mut roots = self.roots.clone();
        roots.sort_by(|a, b| {
            let depth = |handle: &RepresentationHandle| {
                self.nodes.get(handle).map(|node| node.depth).unwrap_or_default()
            };
            depth(b).total_cmp(&depth(a)).then(a.cmp(b))
        });
        roots
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::HitObjectKind;
    use crate::ids::Arena;

    fn handle(kind: HitObjectKind, slot: u32) -> RepresentationHandle {
        RepresentationHandle { kind, slot }
    }

    fn entries(count: usize) -> Vec<EntryId> {
        let mut arena: Arena<EntryId, ()> = Arena::new();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn children_must_be_detached_before_their_parent() {
        let ids = entries(2);
        let mut tree = RenderTree::new();
        let slider = handle(HitObjectKind::Slider, 0);
        let tick = handle(HitObjectKind::SliderTick, 0);

        tree.attach(slider, ids[0], None, 100.0).unwrap();
        tree.attach(tick, ids[1], Some(slider), 150.0).unwrap();
        assert_eq!(tree.children(slider), &[tick]);

        assert!(matches!(
            tree.detach(slider, ids[0]),
            Err(TimelineError::HasAttachedChildren(_))
        ));
        tree.detach(tick, ids[1]).unwrap();
        tree.detach(slider, ids[0]).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn rejects_double_attach_and_unknown_detach() {
        let ids = entries(1);
        let mut tree = RenderTree::new();
        let circle = handle(HitObjectKind::Circle, 0);

        tree.attach(circle, ids[0], None, 0.0).unwrap();
        assert!(matches!(
            tree.attach(circle, ids[0], None, 0.0),
            Err(TimelineError::AlreadyAttached(_))
        ));

        tree.detach(circle, ids[0]).unwrap();
        assert!(matches!(
            tree.detach(circle, ids[0]),
            Err(TimelineError::NotAttached(_))
        ));
    }

    #[test]
    fn draw_order_puts_later_objects_behind() {
        let ids = entries(3);
        let mut tree = RenderTree::new();
        let a = handle(HitObjectKind::Circle, 0);
        let b = handle(HitObjectKind::Circle, 1);
        let c = handle(HitObjectKind::Circle, 2);
        tree.attach(a, ids[0], None, 300.0).unwrap();
        tree.attach(b, ids[1], None, 100.0).unwrap();
        tree.attach(c, ids[2], None, 200.0).unwrap();

        assert_eq!(tree.draw_order(), vec![a, c, b]);
        tree.set_depth(b, 400.0);
        assert_eq!(tree.draw_order(), vec![b, a, c]);
    }
}
