//! An R-tree over axis-aligned rectangles.
//!
//! Nodes split with the classic quadratic heuristic and hold at most 16
//! entries. Queries follow the closed-interval convention of [`Rect`]:
//! an entry whose key touches the query window is reported by
//! [`RTree::intersecting`].
//!
//! The tree is deterministic: identical insertion/removal sequences yield
//! identical structure and identical traversal order.

use crate::rect::Rect;

const MAX_ENTRIES: usize = 16;
const MIN_ENTRIES: usize = 6;

#[derive(Debug, Clone)]
struct Entry<T> {
    rect: Rect,
    value: T,
}

#[derive(Debug, Clone)]
struct Child<T> {
    rect: Rect,
    node: Box<Node<T>>,
}

#[derive(Debug, Clone)]
enum Node<T> {
    Leaf(Vec<Entry<T>>),
    Inner(Vec<Child<T>>),
}

impl<T> Node<T> {
    fn bbox(&self) -> Option<Rect> {
        match self {
            Node::Leaf(entries) => Rect::union_all(entries.iter().map(|e| e.rect)),
            Node::Inner(children) => Rect::union_all(children.iter().map(|c| c.rect)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Inner(children) => children.len(),
        }
    }

    fn collect_entries(self, out: &mut Vec<Entry<T>>) {
        match self {
            Node::Leaf(mut entries) => out.append(&mut entries),
            Node::Inner(children) => {
                for child in children {
                    child.node.collect_entries(out);
                }
            }
        }
    }
}

/// A spatial index mapping rectangles to values of type `T`.
#[derive(Debug, Clone)]
pub struct RTree<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self { root: Node::Leaf(Vec::new()), len: 0 }
    }

    /// The number of entries in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.root = Node::Leaf(Vec::new());
        self.len = 0;
    }

    /// The bounding box of all entries, or [`None`] if the tree is empty.
    pub fn bbox(&self) -> Option<Rect> {
        self.root.bbox()
    }

    /// Inserts `value` keyed by `rect`.
    pub fn insert(&mut self, rect: Rect, value: T) {
        self.len += 1;
        if let Some((sib_rect, sibling)) = insert_rec(&mut self.root, Entry { rect, value }) {
            // root split: grow the tree by one level
            let old_rect = self.root.bbox().unwrap_or(rect);
            let old = std::mem::replace(&mut self.root, Node::Inner(Vec::new()));
            self.root = Node::Inner(vec![
                Child { rect: old_rect, node: Box::new(old) },
                Child { rect: sib_rect, node: Box::new(sibling) },
            ]);
        }
    }

    /// Removes every entry whose key equals `rect` and whose value matches
    /// `pred`, returning the removed values.
    pub fn remove_where(&mut self, rect: Rect, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut orphans = Vec::new();
        remove_rec(&mut self.root, rect, &pred, &mut removed, &mut orphans);
        self.len -= removed.len();

        // collapse a root with zero or one inner children
        loop {
            let replacement = match &mut self.root {
                Node::Inner(children) if children.len() == 1 => {
                    Some(*children.pop().expect("length checked").node)
                }
                Node::Inner(children) if children.is_empty() => Some(Node::Leaf(Vec::new())),
                _ => None,
            };
            match replacement {
                Some(node) => self.root = node,
                None => break,
            }
        }

        for entry in orphans {
            self.len -= 1;
            self.insert(entry.rect, entry.value);
        }
        removed
    }

    /// Returns references to all entries whose key intersects `window`
    /// (touching counts), paired with their keys.
    pub fn intersecting(&self, window: Rect) -> Vec<(&Rect, &T)> {
        let mut out = Vec::new();
        query_rec(&self.root, &window, false, &mut out);
        out
    }

    /// Returns references to all entries whose key lies entirely within
    /// `window`.
    pub fn within(&self, window: Rect) -> Vec<(&Rect, &T)> {
        let mut out = Vec::new();
        query_rec(&self.root, &window, true, &mut out);
        out
    }

    /// Returns true if any entry intersecting `window` satisfies `pred`.
    pub fn any_intersecting(&self, window: Rect, pred: impl Fn(&Rect, &T) -> bool) -> bool {
        any_rec(&self.root, &window, &pred)
    }

    /// Visits every entry in traversal order.
    pub fn for_each(&self, mut f: impl FnMut(&Rect, &T)) {
        fn walk<T>(node: &Node<T>, f: &mut impl FnMut(&Rect, &T)) {
            match node {
                Node::Leaf(entries) => {
                    for e in entries {
                        f(&e.rect, &e.value);
                    }
                }
                Node::Inner(children) => {
                    for c in children {
                        walk(&c.node, f);
                    }
                }
            }
        }
        walk(&self.root, &mut f);
    }

    /// Collects references to every entry in traversal order.
    pub fn entries(&self) -> Vec<(&Rect, &T)> {
        let mut out = Vec::new();
        fn walk<'a, T>(node: &'a Node<T>, out: &mut Vec<(&'a Rect, &'a T)>) {
            match node {
                Node::Leaf(entries) => out.extend(entries.iter().map(|e| (&e.rect, &e.value))),
                Node::Inner(children) => {
                    for c in children {
                        walk(&c.node, out);
                    }
                }
            }
        }
        walk(&self.root, &mut out);
        out
    }
}

impl<T> Extend<(Rect, T)> for RTree<T> {
    fn extend<I: IntoIterator<Item = (Rect, T)>>(&mut self, iter: I) {
        for (rect, value) in iter {
            self.insert(rect, value);
        }
    }
}

fn query_rec<'a, T>(
    node: &'a Node<T>,
    window: &Rect,
    contained: bool,
    out: &mut Vec<(&'a Rect, &'a T)>,
) {
    match node {
        Node::Leaf(entries) => {
            for e in entries {
                let hit = if contained { window.contains(&e.rect) } else { window.intersects(&e.rect) };
                if hit {
                    out.push((&e.rect, &e.value));
                }
            }
        }
        Node::Inner(children) => {
            for c in children {
                if window.intersects(&c.rect) {
                    query_rec(&c.node, window, contained, out);
                }
            }
        }
    }
}

fn any_rec<T>(node: &Node<T>, window: &Rect, pred: &impl Fn(&Rect, &T) -> bool) -> bool {
    match node {
        Node::Leaf(entries) => entries
            .iter()
            .any(|e| window.intersects(&e.rect) && pred(&e.rect, &e.value)),
        Node::Inner(children) => children
            .iter()
            .any(|c| window.intersects(&c.rect) && any_rec(&c.node, window, pred)),
    }
}

/// Inserts into the subtree, returning a new sibling when the node split.
fn insert_rec<T>(node: &mut Node<T>, entry: Entry<T>) -> Option<(Rect, Node<T>)> {
    match node {
        Node::Leaf(entries) => {
            entries.push(entry);
            if entries.len() <= MAX_ENTRIES {
                return None;
            }
            let (a, b) = quadratic_split(std::mem::take(entries), |e: &Entry<T>| e.rect);
            *entries = a;
            let sibling = Node::Leaf(b);
            Some((sibling.bbox().unwrap(), sibling))
        }
        Node::Inner(children) => {
            let idx = choose_subtree(children, entry.rect);
            let split = insert_rec(&mut children[idx].node, entry);
            children[idx].rect = children[idx].node.bbox().unwrap();
            if let Some((sib_rect, sibling)) = split {
                children.push(Child { rect: sib_rect, node: Box::new(sibling) });
            }
            if children.len() <= MAX_ENTRIES {
                return None;
            }
            let (a, b) = quadratic_split(std::mem::take(children), |c: &Child<T>| c.rect);
            *children = a;
            let sibling = Node::Inner(b);
            Some((sibling.bbox().unwrap(), sibling))
        }
    }
}

/// Picks the child needing the least enlargement to cover `rect`.
fn choose_subtree<T>(children: &[Child<T>], rect: Rect) -> usize {
    let mut best = 0;
    let mut best_growth = i64::MAX;
    let mut best_area = i64::MAX;
    for (i, child) in children.iter().enumerate() {
        let area = child.rect.area();
        let growth = child.rect.union(&rect).area() - area;
        if growth < best_growth || (growth == best_growth && area < best_area) {
            best = i;
            best_growth = growth;
            best_area = area;
        }
    }
    best
}

/// The quadratic split of Guttman's original R-tree paper.
fn quadratic_split<E>(mut items: Vec<E>, key: impl Fn(&E) -> Rect) -> (Vec<E>, Vec<E>) {
    debug_assert!(items.len() > MAX_ENTRIES);

    // seed selection: the pair wasting the most area when joined
    let (mut seed_a, mut seed_b, mut worst) = (0, 1, i64::MIN);
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let (ri, rj) = (key(&items[i]), key(&items[j]));
            let waste = ri.union(&rj).area() - ri.area() - rj.area();
            if waste > worst {
                worst = waste;
                seed_a = i;
                seed_b = j;
            }
        }
    }

    // seed_b > seed_a, so remove in this order
    let item_b = items.remove(seed_b);
    let item_a = items.remove(seed_a);
    let mut rect_a = key(&item_a);
    let mut rect_b = key(&item_b);
    let mut group_a = vec![item_a];
    let mut group_b = vec![item_b];

    while let Some(next) = pick_next(&items, rect_a, rect_b, &key) {
        let remaining = items.len();
        // force assignment when a group must absorb the remainder
        if group_a.len() + remaining <= MIN_ENTRIES {
            let item = items.remove(next);
            rect_a = rect_a.union(&key(&item));
            group_a.push(item);
            continue;
        }
        if group_b.len() + remaining <= MIN_ENTRIES {
            let item = items.remove(next);
            rect_b = rect_b.union(&key(&item));
            group_b.push(item);
            continue;
        }

        let item = items.remove(next);
        let r = key(&item);
        let growth_a = rect_a.union(&r).area() - rect_a.area();
        let growth_b = rect_b.union(&r).area() - rect_b.area();
        let to_a = match growth_a.cmp(&growth_b) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => match rect_a.area().cmp(&rect_b.area()) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => group_a.len() <= group_b.len(),
            },
        };
        if to_a {
            rect_a = rect_a.union(&r);
            group_a.push(item);
        } else {
            rect_b = rect_b.union(&r);
            group_b.push(item);
        }
    }

    (group_a, group_b)
}

/// Picks the unassigned item with the greatest assignment preference.
fn pick_next<E>(items: &[E], rect_a: Rect, rect_b: Rect, key: &impl Fn(&E) -> Rect) -> Option<usize> {
    let mut best = None;
    let mut best_diff = -1;
    for (i, item) in items.iter().enumerate() {
        let r = key(item);
        let growth_a = rect_a.union(&r).area() - rect_a.area();
        let growth_b = rect_b.union(&r).area() - rect_b.area();
        let diff = (growth_a - growth_b).abs();
        if diff > best_diff {
            best_diff = diff;
            best = Some(i);
        }
    }
    best
}

fn remove_rec<T>(
    node: &mut Node<T>,
    key: Rect,
    pred: &impl Fn(&T) -> bool,
    removed: &mut Vec<T>,
    orphans: &mut Vec<Entry<T>>,
) {
    match node {
        Node::Leaf(entries) => {
            let mut i = 0;
            while i < entries.len() {
                if entries[i].rect == key && pred(&entries[i].value) {
                    removed.push(entries.remove(i).value);
                } else {
                    i += 1;
                }
            }
        }
        Node::Inner(children) => {
            let mut i = 0;
            while i < children.len() {
                if children[i].rect.intersects(&key) {
                    remove_rec(&mut children[i].node, key, pred, removed, orphans);
                    match children[i].node.bbox() {
                        Some(rect) if children[i].node.len() >= MIN_ENTRIES => {
                            children[i].rect = rect;
                            i += 1;
                        }
                        Some(_) => {
                            // underfull: dissolve and reinsert its entries
                            let child = children.remove(i);
                            child.node.collect_entries(orphans);
                        }
                        None => {
                            children.remove(i);
                        }
                    }
                } else {
                    i += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_rects(n: i32) -> Vec<Rect> {
        let mut rects = Vec::new();
        for i in 0..n {
            for j in 0..n {
                rects.push(Rect::from_sides(i * 10, j * 10, i * 10 + 6, j * 10 + 6));
            }
        }
        rects
    }

    #[test]
    fn intersecting_matches_brute_force() {
        let rects = grid_rects(12);
        let mut tree = RTree::new();
        for (i, r) in rects.iter().enumerate() {
            tree.insert(*r, i);
        }
        assert_eq!(tree.len(), rects.len());

        let window = Rect::from_sides(13, 27, 61, 54);
        let mut expected: Vec<usize> = rects
            .iter()
            .enumerate()
            .filter(|(_, r)| window.intersects(r))
            .map(|(i, _)| i)
            .collect();
        let mut got: Vec<usize> = tree.intersecting(window).iter().map(|(_, &i)| i).collect();
        expected.sort_unstable();
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn within_requires_full_containment() {
        let mut tree = RTree::new();
        tree.insert(Rect::from_sides(0, 0, 10, 10), 'a');
        tree.insert(Rect::from_sides(5, 5, 30, 30), 'b');
        let window = Rect::from_sides(-1, -1, 20, 20);
        let hits: Vec<char> = tree.within(window).iter().map(|(_, &v)| v).collect();
        assert_eq!(hits, vec!['a']);
    }

    #[test]
    fn remove_where_reinserts_survivors() {
        let rects = grid_rects(8);
        let mut tree = RTree::new();
        for (i, r) in rects.iter().enumerate() {
            tree.insert(*r, i);
        }
        let victim = rects[17];
        let removed = tree.remove_where(victim, |&i| i == 17);
        assert_eq!(removed, vec![17]);
        assert_eq!(tree.len(), rects.len() - 1);

        // every survivor is still findable
        for (i, r) in rects.iter().enumerate() {
            let found = tree.any_intersecting(*r, |_, &v| v == i);
            assert_eq!(found, i != 17, "entry {i}");
        }
    }

    #[test]
    fn touching_rectangles_are_reported() {
        let mut tree = RTree::new();
        tree.insert(Rect::from_sides(0, 0, 10, 10), 0);
        assert!(tree.any_intersecting(Rect::from_sides(10, 0, 20, 10), |_, _| true));
        assert!(!tree.any_intersecting(Rect::from_sides(11, 0, 20, 10), |_, _| true));
    }
}
