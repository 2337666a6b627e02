// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Broad-phase collision culling with a dynamic bounding volume hierarchy
//!
//! Every body owns one leaf holding a "fat" AABB: the tight bounds grown by a
//! fixed margin and swept along the body's predicted displacement. Moving a
//! body only restructures the tree when its tight bounds escape the fat ones.
//!
//! Internal nodes are chosen by the surface area heuristic on insertion and
//! kept balanced with AVL-style rotations.
//!
//! # Pair channels
//!
//! [`BroadPhase::query_pairs`] classifies each overlapping pair:
//!
//! - Static/Static pairs never collide and are dropped
//! - pairs whose collision groups do not interact are dropped
//! - pairs involving a sensor, or where neither body is dynamic, go to the
//!   [`PairChannel::Overlap`] channel (reported, never solved)
//! - everything else goes to [`PairChannel::Contact`]

use crate::body::{BodyType, CollisionGroups};
use crate::error::{PhysicsError, Result};
use crate::handle::{Arena, ArenaResource, BodyHandle, LeafId};
use crate::math::{Aabb, Point3, Vec3};
use serde::{Deserialize, Serialize};

const NULL: usize = usize::MAX;

/// What the broad-phase needs to know about the body behind a leaf
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    /// Body the leaf bounds
    pub body: BodyHandle,
    /// Classification used for pair filtering
    pub body_type: BodyType,
    /// Whether the body is a sensor
    pub sensor: bool,
    /// Collision groups used for pair filtering
    pub groups: CollisionGroups,
}

/// Output channel of a candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairChannel {
    /// Solved through a contact manifold
    Contact,
    /// Only reported as an overlap (trigger) event
    Overlap,
}

/// A pair of leaves whose fat AABBs overlap
///
/// `body_a` always has the lower slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    /// Body with the lower slot index
    pub body_a: BodyHandle,
    /// Body with the higher slot index
    pub body_b: BodyHandle,
    /// Leaf of `body_a`
    pub leaf_a: LeafId,
    /// Leaf of `body_b`
    pub leaf_b: LeafId,
    /// Where the pair is routed
    pub channel: PairChannel,
}

#[derive(Debug, Clone)]
struct LeafData {
    node: usize,
    proxy: Proxy,
}

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    parent: usize,
    children: [usize; 2],
    height: i32,
    leaf: Option<LeafId>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL
    }
}

/// Dynamic AABB tree over body bounds
#[derive(Debug, Clone)]
pub struct BroadPhase {
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    root: usize,
    leaves: Arena<LeafData>,
    margin: f64,
}

impl BroadPhase {
    /// Create an empty tree holding at most `max_leaves` leaves
    ///
    /// `margin` is added on every side of a leaf's tight bounds.
    pub fn new(margin: f64, max_leaves: usize) -> Self {
        BroadPhase {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: NULL,
            leaves: Arena::with_limit(ArenaResource::Leaves, max_leaves),
            margin,
        }
    }

    /// Fat margin in use
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree has no leaves
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Height of the tree (0 for a single leaf or an empty tree)
    pub fn height(&self) -> i32 {
        if self.root == NULL {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Insert a body's tight bounds and return its leaf
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the leaf table is full, `DegenerateGeometry`
    /// for non-finite bounds.
    pub fn insert(&mut self, proxy: Proxy, aabb: &Aabb) -> Result<LeafId> {
        self.insert_fat(proxy, aabb.expanded(self.margin))
    }

    /// Insert a leaf with exactly the given fat bounds
    ///
    /// Used when rebuilding from a snapshot, where the stored fat AABBs must
    /// be reproduced so that the candidate set is unchanged.
    pub fn insert_fat(&mut self, proxy: Proxy, fat: Aabb) -> Result<LeafId> {
        if !fat.is_finite() {
            return Err(PhysicsError::DegenerateGeometry(format!(
                "non-finite bounds for {}",
                proxy.body
            )));
        }
        let raw = self.leaves.insert(LeafData { node: NULL, proxy })?;
        let leaf = LeafId::from_raw(raw);
        let node = self.alloc_node(Node {
            aabb: fat,
            parent: NULL,
            children: [NULL, NULL],
            height: 0,
            leaf: Some(leaf),
        });
        if let Some(data) = self.leaves.get_mut(raw) {
            data.node = node;
        }
        self.insert_leaf(node);
        Ok(leaf)
    }

    /// Refresh a leaf with new tight bounds
    ///
    /// Returns whether the tree was restructured.
    pub fn update(&mut self, leaf: LeafId, aabb: &Aabb) -> Result<bool> {
        self.update_predicted(leaf, aabb, &Vec3::zeros())
    }

    /// Refresh a leaf, sweeping the new fat bounds along `displacement`
    ///
    /// Nothing changes while `aabb` stays inside the current fat bounds.
    pub fn update_predicted(&mut self, leaf: LeafId, aabb: &Aabb, displacement: &Vec3) -> Result<bool> {
        let node = self.leaf_node(leaf)?;
        if !aabb.is_finite() || !displacement.iter().all(|v| v.is_finite()) {
            return Err(PhysicsError::DegenerateGeometry(format!("non-finite bounds for {}", leaf)));
        }
        if self.nodes[node].aabb.contains(aabb) {
            return Ok(false);
        }
        self.remove_leaf(node);
        self.nodes[node].aabb = aabb.expanded(self.margin).swept(displacement);
        self.insert_leaf(node);
        Ok(true)
    }

    /// Remove a leaf
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the leaf was already removed.
    pub fn remove(&mut self, leaf: LeafId) -> Result<Proxy> {
        let data = self.leaves.remove(leaf.raw()).ok_or_else(|| leaf.invalid())?;
        self.remove_leaf(data.node);
        self.free_node(data.node);
        Ok(data.proxy)
    }

    /// Whether the leaf is live
    pub fn contains(&self, leaf: LeafId) -> bool {
        self.leaves.contains(leaf.raw())
    }

    /// Proxy stored for a leaf
    pub fn proxy(&self, leaf: LeafId) -> Result<&Proxy> {
        self.leaves
            .get(leaf.raw())
            .map(|d| &d.proxy)
            .ok_or_else(|| leaf.invalid())
    }

    /// Current fat bounds of a leaf
    pub fn fat_aabb(&self, leaf: LeafId) -> Result<Aabb> {
        Ok(self.nodes[self.leaf_node(leaf)?].aabb)
    }

    /// Every overlapping leaf pair, each emitted once, sorted by body slot
    pub fn query_pairs(&self) -> Vec<CandidatePair> {
        let mut pairs = Vec::new();
        if self.root == NULL {
            return pairs;
        }
        let mut self_stack = vec![self.root];
        let mut cross_stack: Vec<(usize, usize)> = Vec::new();
        while let Some(n) = self_stack.pop() {
            let node = &self.nodes[n];
            if node.is_leaf() {
                continue;
            }
            let [l, r] = node.children;
            self_stack.push(l);
            self_stack.push(r);
            cross_stack.push((l, r));
            while let Some((a, b)) = cross_stack.pop() {
                let (na, nb) = (&self.nodes[a], &self.nodes[b]);
                if !na.aabb.overlaps(&nb.aabb) {
                    continue;
                }
                match (na.leaf, nb.leaf) {
                    (Some(la), Some(lb)) => {
                        if let Some(pair) = self.classify(la, lb) {
                            pairs.push(pair);
                        }
                    }
                    // Descend into the taller side first
                    _ if nb.is_leaf() || (!na.is_leaf() && na.height >= nb.height) => {
                        cross_stack.push((na.children[0], b));
                        cross_stack.push((na.children[1], b));
                    }
                    _ => {
                        cross_stack.push((a, nb.children[0]));
                        cross_stack.push((a, nb.children[1]));
                    }
                }
            }
        }
        pairs.sort_unstable_by_key(|p| (p.body_a.index(), p.body_b.index()));
        pairs
    }

    /// Leaves whose fat bounds overlap `aabb`
    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<LeafId> {
        let mut out = Vec::new();
        self.traverse(|node| node.aabb.overlaps(aabb), |leaf| out.push(leaf));
        out
    }

    /// Leaves whose fat bounds a ray enters within `max_t`
    ///
    /// No distance order is guaranteed.
    pub fn query_ray(&self, origin: &Point3, dir: &Vec3, max_t: f64) -> Vec<LeafId> {
        let mut out = Vec::new();
        self.traverse(
            |node| node.aabb.ray_entry(origin, dir, max_t).is_some(),
            |leaf| out.push(leaf),
        );
        out
    }

    fn traverse(&self, mut visit: impl FnMut(&Node) -> bool, mut emit: impl FnMut(LeafId)) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !visit(node) {
                continue;
            }
            match node.leaf {
                Some(leaf) => emit(leaf),
                None => stack.extend_from_slice(&node.children),
            }
        }
    }

    fn classify(&self, la: LeafId, lb: LeafId) -> Option<CandidatePair> {
        let pa = &self.leaves.get(la.raw())?.proxy;
        let pb = &self.leaves.get(lb.raw())?.proxy;
        if pa.body_type == BodyType::Static && pb.body_type == BodyType::Static {
            return None;
        }
        if !pa.groups.interacts_with(&pb.groups) {
            return None;
        }
        let channel = if pa.sensor || pb.sensor || !(pa.body_type.is_dynamic() || pb.body_type.is_dynamic()) {
            PairChannel::Overlap
        } else {
            PairChannel::Contact
        };
        let (a, b) = if pa.body.index() <= pb.body.index() {
            ((pa.body, la), (pb.body, lb))
        } else {
            ((pb.body, lb), (pa.body, la))
        };
        Some(CandidatePair {
            body_a: a.0,
            body_b: b.0,
            leaf_a: a.1,
            leaf_b: b.1,
            channel,
        })
    }

    fn leaf_node(&self, leaf: LeafId) -> Result<usize> {
        self.leaves
            .get(leaf.raw())
            .map(|d| d.node)
            .ok_or_else(|| leaf.invalid())
    }

    fn alloc_node(&mut self, node: Node) -> usize {
        match self.free_nodes.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, i: usize) {
        let node = &mut self.nodes[i];
        node.parent = NULL;
        node.children = [NULL, NULL];
        node.height = -1;
        node.leaf = None;
        self.free_nodes.push(i);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL {
            self.root = leaf;
            self.nodes[leaf].parent = NULL;
            return;
        }

        // Surface area heuristic descent
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let area = node.aabb.surface_area();
            let combined_area = node.aabb.merged(&leaf_aabb).surface_area();
            let cost = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);
            let child_cost = |c: usize| {
                let child = &self.nodes[c];
                let merged = leaf_aabb.merged(&child.aabb).surface_area();
                if child.is_leaf() {
                    merged + inheritance
                } else {
                    merged - child.aabb.surface_area() + inheritance
                }
            };
            let [c0, c1] = node.children;
            let (cost0, cost1) = (child_cost(c0), child_cost(c1));
            if cost < cost0 && cost < cost1 {
                break;
            }
            index = if cost0 <= cost1 { c0 } else { c1 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc_node(Node {
            aabb: leaf_aabb.merged(&self.nodes[sibling].aabb),
            parent: old_parent,
            children: [sibling, leaf],
            height: self.nodes[sibling].height + 1,
            leaf: None,
        });
        if old_parent == NULL {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, sibling, new_parent);
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;
        self.fix_upwards(new_parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL;
            return;
        }
        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let [c0, c1] = self.nodes[parent].children;
        let sibling = if c0 == leaf { c1 } else { c0 };

        if grand_parent == NULL {
            self.root = sibling;
            self.nodes[sibling].parent = NULL;
            self.free_node(parent);
        } else {
            self.replace_child(grand_parent, parent, sibling);
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.fix_upwards(grand_parent);
        }
        self.nodes[leaf].parent = NULL;
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        let children = &mut self.nodes[parent].children;
        if children[0] == old {
            children[0] = new;
        } else {
            children[1] = new;
        }
    }

    fn refit(&mut self, i: usize) {
        let [c0, c1] = self.nodes[i].children;
        let aabb = self.nodes[c0].aabb.merged(&self.nodes[c1].aabb);
        let height = 1 + self.nodes[c0].height.max(self.nodes[c1].height);
        let node = &mut self.nodes[i];
        node.aabb = aabb;
        node.height = height;
    }

    fn fix_upwards(&mut self, start: usize) {
        let mut index = start;
        while index != NULL {
            index = self.balance(index);
            self.refit(index);
            index = self.nodes[index].parent;
        }
    }

    /// Rotate the taller grandchild up if the subtree at `a` is unbalanced
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }
        let [b, c] = self.nodes[a].children;
        let skew = self.nodes[c].height - self.nodes[b].height;
        if skew > 1 {
            self.rotate_up(a, 1)
        } else if skew < -1 {
            self.rotate_up(a, 0)
        } else {
            a
        }
    }

    /// Promote child `side` of `a` to take `a`'s place
    fn rotate_up(&mut self, a: usize, side: usize) -> usize {
        let other = 1 - side;
        let up = self.nodes[a].children[side];
        let stay = self.nodes[a].children[other];
        let [f, g] = self.nodes[up].children;

        let parent = self.nodes[a].parent;
        self.nodes[up].parent = parent;
        self.nodes[a].parent = up;
        if parent == NULL {
            self.root = up;
        } else {
            self.replace_child(parent, a, up);
        }

        // The taller grandchild stays with `up`, the shorter moves under `a`
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up].children = [a, keep];
        self.nodes[a].children[side] = give;
        self.nodes[a].children[other] = stay;
        self.nodes[give].parent = a;
        self.refit(a);
        self.refit(up);
        up
    }

    /// Check structural invariants; used by tests
    #[cfg(test)]
    fn validate(&self) -> usize {
        fn walk(tree: &BroadPhase, i: usize, parent: usize) -> (i32, usize) {
            let node = &tree.nodes[i];
            assert_eq!(node.parent, parent);
            if node.is_leaf() {
                assert_eq!(node.height, 0);
                assert!(node.leaf.is_some());
                return (0, 1);
            }
            let [c0, c1] = node.children;
            let (h0, n0) = walk(tree, c0, i);
            let (h1, n1) = walk(tree, c1, i);
            assert_eq!(node.height, 1 + h0.max(h1));
            assert!(node.aabb.contains(&tree.nodes[c0].aabb));
            assert!(node.aabb.contains(&tree.nodes[c1].aabb));
            (node.height, n0 + n1)
        }
        if self.root == NULL {
            return 0;
        }
        walk(self, self.root, NULL).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(index: u32, body_type: BodyType) -> Proxy {
        Proxy {
            body: BodyHandle::new(index, 0),
            body_type,
            sensor: false,
            groups: CollisionGroups::ALL,
        }
    }

    fn unit_box_at(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::from_center(Point3::new(x, y, z), Vec3::new(0.5, 0.5, 0.5))
    }

    fn brute_force(tree: &BroadPhase, leaves: &[LeafId]) -> usize {
        let mut count = 0;
        for i in 0..leaves.len() {
            for j in (i + 1)..leaves.len() {
                let (a, b) = (tree.fat_aabb(leaves[i]).unwrap(), tree.fat_aabb(leaves[j]).unwrap());
                if a.overlaps(&b) {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_separated_boxes_produce_no_pairs() {
        let mut tree = BroadPhase::new(0.1, 1024);
        for i in 0..64 {
            let (x, z) = ((i % 8) as f64 * 3.0, (i / 8) as f64 * 3.0);
            tree.insert(proxy(i, BodyType::Dynamic), &unit_box_at(x, 0.0, z)).unwrap();
        }
        assert_eq!(tree.validate(), 64);
        assert!(tree.query_pairs().is_empty());
    }

    #[test]
    fn test_pairs_match_brute_force() {
        let mut tree = BroadPhase::new(0.1, 1024);
        let mut leaves = Vec::new();
        // Deterministic scatter with plenty of overlaps
        let mut seed = 12345u64;
        for i in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let x = ((seed >> 33) % 200) as f64 * 0.1;
            let y = ((seed >> 17) % 200) as f64 * 0.1;
            let z = ((seed >> 5) % 200) as f64 * 0.1;
            leaves.push(tree.insert(proxy(i, BodyType::Dynamic), &unit_box_at(x, y, z)).unwrap());
        }
        tree.validate();
        let pairs = tree.query_pairs();
        assert_eq!(pairs.len(), brute_force(&tree, &leaves));
        for w in pairs.windows(2) {
            assert!((w[0].body_a.index(), w[0].body_b.index()) < (w[1].body_a.index(), w[1].body_b.index()));
        }
    }

    #[test]
    fn test_update_inside_fat_bounds_is_free() {
        let mut tree = BroadPhase::new(0.5, 16);
        let leaf = tree.insert(proxy(0, BodyType::Dynamic), &unit_box_at(0.0, 0.0, 0.0)).unwrap();
        assert!(!tree.update(leaf, &unit_box_at(0.2, 0.0, 0.0)).unwrap());
        assert!(tree.update(leaf, &unit_box_at(2.0, 0.0, 0.0)).unwrap());
        assert!(tree.fat_aabb(leaf).unwrap().contains(&unit_box_at(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_moving_into_overlap_yields_one_pair() {
        let mut tree = BroadPhase::new(0.1, 16);
        let a = tree.insert(proxy(0, BodyType::Dynamic), &unit_box_at(0.0, 0.0, 0.0)).unwrap();
        tree.insert(proxy(1, BodyType::Dynamic), &unit_box_at(10.0, 0.0, 0.0)).unwrap();
        assert!(tree.query_pairs().is_empty());
        tree.update(a, &unit_box_at(9.5, 0.0, 0.0)).unwrap();
        let pairs = tree.query_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].channel, PairChannel::Contact);
    }

    #[test]
    fn test_channel_classification() {
        let mut tree = BroadPhase::new(0.1, 16);
        let b = unit_box_at(0.0, 0.0, 0.0);
        tree.insert(proxy(0, BodyType::Static), &b).unwrap();
        tree.insert(proxy(1, BodyType::Static), &b).unwrap();
        tree.insert(proxy(2, BodyType::Kinematic), &b).unwrap();
        let pairs = tree.query_pairs();
        // static/static dropped; both static/kinematic pairs are overlap-only
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.channel == PairChannel::Overlap));

        let mut sensor = proxy(3, BodyType::Dynamic);
        sensor.sensor = true;
        tree.insert(sensor, &b).unwrap();
        let dynamic_pairs: Vec<_> = tree.query_pairs().into_iter().filter(|p| p.body_b.index() == 3).collect();
        assert_eq!(dynamic_pairs.len(), 3);
        assert!(dynamic_pairs.iter().all(|p| p.channel == PairChannel::Overlap));
    }

    #[test]
    fn test_groups_filter_pairs() {
        let mut tree = BroadPhase::new(0.1, 16);
        let b = unit_box_at(0.0, 0.0, 0.0);
        let mut a = proxy(0, BodyType::Dynamic);
        a.groups = CollisionGroups::new(0b01, 0b01);
        let mut c = proxy(1, BodyType::Dynamic);
        c.groups = CollisionGroups::new(0b10, 0b10);
        tree.insert(a, &b).unwrap();
        tree.insert(c, &b).unwrap();
        assert!(tree.query_pairs().is_empty());
    }

    #[test]
    fn test_stale_leaf_rejected() {
        let mut tree = BroadPhase::new(0.1, 16);
        let leaf = tree.insert(proxy(0, BodyType::Dynamic), &unit_box_at(0.0, 0.0, 0.0)).unwrap();
        tree.remove(leaf).unwrap();
        let reused = tree.insert(proxy(1, BodyType::Dynamic), &unit_box_at(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(reused.index(), leaf.index());
        assert!(matches!(tree.remove(leaf), Err(PhysicsError::InvalidHandle { .. })));
        assert!(matches!(
            tree.update(leaf, &unit_box_at(1.0, 0.0, 0.0)),
            Err(PhysicsError::InvalidHandle { .. })
        ));
        assert!(tree.contains(reused));
    }

    #[test]
    fn test_capacity_refused() {
        let mut tree = BroadPhase::new(0.1, 2);
        let b = unit_box_at(0.0, 0.0, 0.0);
        tree.insert(proxy(0, BodyType::Dynamic), &b).unwrap();
        tree.insert(proxy(1, BodyType::Dynamic), &b).unwrap();
        assert!(matches!(
            tree.insert(proxy(2, BodyType::Dynamic), &b),
            Err(PhysicsError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_remove_keeps_tree_balanced() {
        let mut tree = BroadPhase::new(0.0, 1024);
        let leaves: Vec<_> = (0..100)
            .map(|i| tree.insert(proxy(i, BodyType::Dynamic), &unit_box_at(i as f64 * 2.0, 0.0, 0.0)).unwrap())
            .collect();
        for leaf in leaves.iter().step_by(2) {
            tree.remove(*leaf).unwrap();
        }
        assert_eq!(tree.validate(), 50);
        assert!(tree.height() < 25);
    }

    #[test]
    fn test_query_ray_and_aabb() {
        let mut tree = BroadPhase::new(0.0, 16);
        let near = tree.insert(proxy(0, BodyType::Static), &unit_box_at(5.0, 0.0, 0.0)).unwrap();
        let off = tree.insert(proxy(1, BodyType::Static), &unit_box_at(5.0, 5.0, 0.0)).unwrap();
        let hits = tree.query_ray(&Point3::origin(), &Vec3::x(), 10.0);
        assert_eq!(hits, vec![near]);
        assert!(tree.query_ray(&Point3::origin(), &Vec3::x(), 2.0).is_empty());
        let found = tree.query_aabb(&Aabb::from_center(Point3::new(5.0, 5.0, 0.0), Vec3::repeat(0.1)));
        assert_eq!(found, vec![off]);
    }

    #[test]
    fn test_predicted_update_sweeps_bounds() {
        let mut tree = BroadPhase::new(0.1, 16);
        let leaf = tree.insert(proxy(0, BodyType::Dynamic), &unit_box_at(0.0, 0.0, 0.0)).unwrap();
        tree.update_predicted(leaf, &unit_box_at(1.0, 0.0, 0.0), &Vec3::new(2.0, 0.0, 0.0))
            .unwrap();
        let fat = tree.fat_aabb(leaf).unwrap();
        assert!(fat.max.x >= 3.5);
        assert!(fat.min.x <= 0.41);
    }
}
