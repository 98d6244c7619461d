use slab::Slab;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::mem;
use std::num::NonZero;
use std::ops::{Index, IndexMut};

/// A reference to a live node, offset by one from its [Slab] index so that
/// the niche makes [Ref] pointer-sized.
pub(crate) type SafeRef = NonZero<usize>;
/// A child or parent link; `None` is an external (absent) position.
pub(crate) type Ref = Option<SafeRef>;
pub(crate) const SENTINEL: Ref = None;

pub(crate) const LEFT: usize = 0;
pub(crate) const RIGHT: usize = 1;

/// Structural links of a node, indexed by [LEFT]/[RIGHT] so the symmetric
/// fixup cases share one body parameterized by `dir` and `dir ^ 1`.
pub(crate) struct RbNode {
    pub(crate) parent: Ref,
    pub(crate) children: [Ref; 2],
    pub(crate) red: bool,
}

pub(crate) struct Node<K, V> {
    pub(crate) rb: RbNode,
    /// Number of nodes in the subtree rooted here, including this one.
    pub(crate) size: usize,
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: V) -> Self {
        Self {
            rb: RbNode {
                parent: SENTINEL,
                children: [SENTINEL, SENTINEL],
                red: true,
            },
            size: 1,
            key,
            value,
        }
    }
}

pub(crate) struct RbTree<K, V> {
    slab: Slab<Node<K, V>>,
    root: Ref,
}

impl<K, V> Index<SafeRef> for RbTree<K, V> {
    type Output = Node<K, V>;

    fn index(&self, index: SafeRef) -> &Self::Output {
        &self.slab[index.get() - 1]
    }
}
impl<K, V> IndexMut<SafeRef> for RbTree<K, V> {
    fn index_mut(&mut self, index: SafeRef) -> &mut Self::Output {
        &mut self.slab[index.get() - 1]
    }
}

impl<K, V> RbTree<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slab: Slab::new(),
            root: SENTINEL,
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Slab::with_capacity(capacity),
            root: SENTINEL,
        }
    }

    pub(crate) fn root(&self) -> Ref {
        self.root
    }

    pub(crate) fn clear(&mut self) {
        self.slab.clear();
        self.root = SENTINEL;
    }

    fn insert_slot(&mut self, node: Node<K, V>) -> SafeRef {
        let index = self.slab.insert(node);
        SafeRef::new(index + 1).unwrap()
    }

    fn remove_slot(&mut self, index: SafeRef) -> Node<K, V> {
        self.slab.remove(index.get() - 1)
    }

    pub(crate) fn size_of(&self, node: Ref) -> usize {
        node.map_or(0, |n| self[n].size)
    }

    fn is_red(&self, node: Ref) -> bool {
        node.is_some_and(|n| self[n].rb.red)
    }

    /// Returns the extreme node of the subtree at `this` in direction `dir`
    /// ([LEFT] for the minimum, [RIGHT] for the maximum).
    pub(crate) fn edge(&self, mut this: SafeRef, dir: usize) -> SafeRef {
        while let Some(child) = self[this].rb.children[dir] {
            this = child;
        }
        this
    }

    /// Returns the in-order neighbor of `this` ([RIGHT] for the successor,
    /// [LEFT] for the predecessor), or [SENTINEL] at the edge of the tree.
    pub(crate) fn next(&self, mut this: SafeRef, dir: usize) -> Ref {
        if let Some(child) = self[this].rb.children[dir] {
            return Some(self.edge(child, dir ^ 1));
        }
        let mut y = self[this].rb.parent;
        while let Some(p) = y
            && self[p].rb.children[dir] == Some(this)
        {
            this = p;
            y = self[p].rb.parent;
        }
        y
    }

    pub(crate) fn find<Q>(&self, key: &Q) -> Ref
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut curr = self.root;
        while let Some(c) = curr {
            let node = &self[c];
            match key.cmp(node.key.borrow()) {
                Ordering::Less => curr = node.rb.children[LEFT],
                Ordering::Greater => curr = node.rb.children[RIGHT],
                Ordering::Equal => return curr,
            }
        }
        SENTINEL
    }

    /// Descends by subtree size to the node with exactly `rank` keys before
    /// it in order.
    pub(crate) fn select(&self, mut rank: usize) -> Ref {
        let mut curr = self.root;
        while let Some(c) = curr {
            let node = &self[c];
            let left = self.size_of(node.rb.children[LEFT]);
            match rank.cmp(&left) {
                Ordering::Less => curr = node.rb.children[LEFT],
                Ordering::Equal => return curr,
                Ordering::Greater => {
                    rank -= left + 1;
                    curr = node.rb.children[RIGHT];
                }
            }
        }
        SENTINEL
    }

    /// Counts the keys ordered before `key`; `Ok` when the key itself is
    /// present, `Err` with its would-be rank otherwise.
    pub(crate) fn rank<Q>(&self, key: &Q) -> Result<usize, usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut before = 0;
        let mut curr = self.root;
        while let Some(c) = curr {
            let node = &self[c];
            match key.cmp(node.key.borrow()) {
                Ordering::Less => curr = node.rb.children[LEFT],
                Ordering::Greater => {
                    before += self.size_of(node.rb.children[LEFT]) + 1;
                    curr = node.rb.children[RIGHT];
                }
                Ordering::Equal => {
                    return Ok(before + self.size_of(node.rb.children[LEFT]));
                }
            }
        }
        Err(before)
    }

    fn replace(&mut self, node: SafeRef, with: Ref) {
        let parent = self[node].rb.parent;
        if let Some(w) = with {
            self[w].rb.parent = parent;
        }
        match parent {
            None => self.root = with,
            Some(p) => {
                let pn = &mut self[p].rb;
                let dir = if pn.children[0] == Some(node) { 0 } else { 1 };
                pn.children[dir] = with;
            }
        }
    }

    pub(crate) fn rotate(&mut self, x: Ref, dir: usize) {
        debug_assert!(dir == 0 || dir == 1);
        let dir = dir & 1;
        let Some(x) = x else { return };
        let Some(y) = self[x].rb.children[dir ^ 1] else {
            return;
        };

        // fix sizes: y inherits x's subtree total, x is recounted below
        let x_size = self[x].size;

        self[x].rb.children[dir ^ 1] = self[y].rb.children[dir];
        if let Some(y_child) = self[y].rb.children[dir] {
            self[y_child].rb.parent = Some(x);
        }
        self.replace(x, Some(y));
        self[y].rb.children[dir] = Some(x);
        self[x].rb.parent = Some(y);

        self[y].size = x_size;
        let [l, r] = self[x].rb.children;
        self[x].size = 1 + self.size_of(l) + self.size_of(r);
    }

    /// Applies `delta` to the subtree size of `from` and every ancestor.
    fn update_sizes(&mut self, from: Ref, delta: isize) {
        let mut x = from;
        while let Some(n) = x {
            let node = &mut self[n];
            node.size = node.size.wrapping_add_signed(delta);
            x = node.rb.parent;
        }
    }

    /// Links a fresh node under `parent` (as the new root when `parent` is
    /// [SENTINEL]) and restores the red-black invariants.
    pub(crate) fn attach(&mut self, parent: Ref, dir: usize, node: Node<K, V>) -> SafeRef {
        let z = self.insert_slot(node);
        match parent {
            None => {
                debug_assert!(self.root.is_none());
                self.root = Some(z);
            }
            Some(p) => {
                debug_assert!(self[p].rb.children[dir].is_none());
                self[p].rb.children[dir] = Some(z);
                self[z].rb.parent = parent;
            }
        }
        self.update_sizes(parent, 1);
        self.fix_insert(z);
        z
    }

    fn fix_insert(&mut self, mut z: SafeRef) {
        while let Some(p) = self[z].rb.parent
            && self[p].rb.red
        {
            // a red parent is never the root, so the grandparent exists
            let Some(pp) = self[p].rb.parent else {
                unreachable!()
            };
            let dir = if self[pp].rb.children[0] == Some(p) { 1 } else { 0 };

            let y = self[pp].rb.children[dir];
            if let Some(y) = y
                && self[y].rb.red
            {
                self[p].rb.red = false;
                self[y].rb.red = false;
                self[pp].rb.red = true;
                z = pp;
            } else {
                // the uncle is black, or an external position
                let mut p = p;
                let mut pp = pp;
                if self[p].rb.children[dir] == Some(z) {
                    z = p;
                    self.rotate(Some(z), dir ^ 1);

                    // recompute parent and grandparent after the rotation
                    let Some(np) = self[z].rb.parent else {
                        unreachable!()
                    };
                    p = np;
                    let Some(npp) = self[p].rb.parent else {
                        unreachable!()
                    };
                    pp = npp;
                }
                self[p].rb.red = false;
                self[pp].rb.red = true;
                self.rotate(Some(pp), dir);
            }
        }

        // blacken the root
        if let Some(root) = self.root {
            self[root].rb.red = false;
        }
    }

    /// Unlinks the node at `z` and returns its key-value pair. When `z` has
    /// two children its in-order successor is spliced out instead and its
    /// payload moves into `z`, so the physically removed node always has at
    /// most one child.
    pub(crate) fn unlink(&mut self, z: SafeRef) -> (K, V) {
        let y = match self[z].rb.children[RIGHT] {
            Some(right) if self[z].rb.children[LEFT].is_some() => self.edge(right, LEFT),
            _ => z,
        };

        let dir = if self[y].rb.children[LEFT].is_none() {
            RIGHT
        } else {
            LEFT
        };
        let x = self[y].rb.children[dir];
        let y_red = self[y].rb.red;
        let p = self[y].rb.parent;

        self.replace(y, x);
        self.update_sizes(p, -1);
        if !y_red {
            self.fix_delete(x, p);
        }

        let removed = self.remove_slot(y);
        if y != z {
            // move the successor's payload into z; the caller gets z's pair
            let node = &mut self[z];
            let key = mem::replace(&mut node.key, removed.key);
            let value = mem::replace(&mut node.value, removed.value);
            (key, value)
        } else {
            (removed.key, removed.value)
        }
    }

    // The deficient position `x` may be an external one, so its parent is
    // carried alongside instead of read back from the arena.
    fn fix_delete(&mut self, mut x: Ref, mut p: Ref) {
        while x != self.root && !self.is_red(x) {
            let Some(pi) = p else { break };
            let dir = if self[pi].rb.children[0] == x { 1 } else { 0 };
            // a doubly black node always has a live sibling
            let Some(mut w) = self[pi].rb.children[dir] else {
                unreachable!()
            };
            if self[w].rb.red {
                self[w].rb.red = false;
                self[pi].rb.red = true;
                self.rotate(Some(pi), dir ^ 1);

                // recompute w after the rotation of p
                let Some(nw) = self[pi].rb.children[dir] else {
                    unreachable!()
                };
                w = nw;
            }
            let [wl, wr] = self[w].rb.children;
            if !self.is_red(wl) && !self.is_red(wr) {
                self[w].rb.red = true;
                x = Some(pi);
                p = self[pi].rb.parent;
            } else {
                let mut wc = self[w].rb.children[dir]; // w child i care about
                let wo = self[w].rb.children[dir ^ 1]; // w other child
                if !self.is_red(wc) {
                    if let Some(wo) = wo {
                        self[wo].rb.red = false;
                    }
                    self[w].rb.red = true;
                    self.rotate(Some(w), dir);

                    // recompute w and wc after the rotation of w
                    let Some(nw) = self[pi].rb.children[dir] else {
                        unreachable!()
                    };
                    w = nw;
                    wc = self[w].rb.children[dir];
                }
                self[w].rb.red = self[pi].rb.red;
                self[pi].rb.red = false;
                if let Some(wc) = wc {
                    self[wc].rb.red = false;
                }
                self.rotate(Some(pi), dir ^ 1);
                x = self.root;
                p = SENTINEL;
            }
        }

        // blacken x
        if let Some(x) = x {
            self[x].rb.red = false;
        }
    }
}

#[cfg(test)]
use std::collections::VecDeque;

#[cfg(test)]
impl<K: Ord, V> RbTree<K, V> {
    pub(crate) fn is_valid(&self) -> usize {
        /*
         * properties
         * - root property: root is black
         * - external positions (None links) count as black
         * - red property: children of a red node are black
         * - simple path from node to descendant leaf contains same number of black nodes
         * - search property: in-order traversal yields strictly ascending keys
         * - size property: every node counts itself plus both child subtrees
         */
        fn verify_black_height<K, V>(rb: &RbTree<K, V>, x: Ref) -> i32 {
            let Some(x) = x else { return 0 };
            let left_height = verify_black_height(rb, rb[x].rb.children[0]);
            let right_height = verify_black_height(rb, rb[x].rb.children[1]);

            assert!(
                left_height != -1 && right_height != -1 && left_height == right_height,
                "red-black properties have been violated!"
            );

            let add = if rb[x].rb.red { 0 } else { 1 };
            left_height + add
        }

        fn verify_children_color<K, V>(rb: &RbTree<K, V>) {
            let Some(root) = rb.root else { return };
            let mut queue: VecDeque<SafeRef> = VecDeque::new();
            queue.push_front(root);

            while let Some(curr) = queue.pop_front() {
                let [l, r] = rb[curr].rb.children;

                // red node must not have red children
                if rb[curr].rb.red {
                    assert!(!rb.is_red(l) && !rb.is_red(r), "red node has red children");
                }

                if let Some(l) = l {
                    queue.push_back(l);
                }
                if let Some(r) = r {
                    queue.push_back(r);
                }
            }
        }

        fn verify_order<'a, K: Ord, V>(
            rb: &'a RbTree<K, V>,
            x: Ref,
            lo: Option<&'a K>,
            hi: Option<&'a K>,
        ) {
            let Some(x) = x else { return };
            let key = &rb[x].key;
            if let Some(lo) = lo {
                assert!(lo < key, "keys out of order");
            }
            if let Some(hi) = hi {
                assert!(key < hi, "keys out of order");
            }
            verify_order(rb, rb[x].rb.children[0], lo, Some(key));
            verify_order(rb, rb[x].rb.children[1], Some(key), hi);
        }

        fn verify_sizes<K, V>(rb: &RbTree<K, V>, x: Ref) -> usize {
            let Some(x) = x else { return 0 };
            let node = &rb[x];
            for child in node.rb.children.into_iter().flatten() {
                assert_eq!(rb[child].rb.parent, Some(x), "stale parent link");
            }
            let left = verify_sizes(rb, node.rb.children[0]);
            let right = verify_sizes(rb, node.rb.children[1]);
            assert_eq!(node.size, 1 + left + right, "subtree size out of sync");
            node.size
        }

        assert!(!self.is_red(self.root)); // root is black
        verify_children_color(self);
        verify_black_height(self, self.root);
        verify_order(self, self.root, None, None);
        verify_sizes(self, self.root)
    }
}

#[cfg(test)]
impl<K, V> RbTree<K, V> {
    pub(crate) fn height(&self) -> usize {
        fn depth<K, V>(rb: &RbTree<K, V>, x: Ref) -> usize {
            let Some(x) = x else { return 0 };
            let left = depth(rb, rb[x].rb.children[0]);
            let right = depth(rb, rb[x].rb.children[1]);
            1 + left.max(right)
        }
        depth(self, self.root)
    }

    pub(crate) fn slab(&self, index: usize) -> &Node<K, V> {
        &self.slab[index - 1]
    }

    pub(crate) fn slab_len(&self) -> usize {
        self.slab.len()
    }
}
