//! Left-leaning red/black tree keyed by [KeyTuple], with per-node
//! subtree entry counts.
//!
//! Each node holds every row address sharing one key, so unique and
//! multi indexes share the structure. The subtree counts give
//! O(log n) rank queries, which is what the countable index contract
//! (index-count plans) is built on. Strictly single threaded.

use std::cmp::Ordering;

use crate::{
    tuple::{KeyTuple, RowId},
    Result,
};

pub struct Node {
    key: KeyTuple,
    rows: Vec<RowId>,
    black: bool,
    /// Row entries in this node and both subtrees.
    count: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(key: KeyTuple, row: RowId) -> Node {
        Node {
            key,
            rows: vec![row],
            black: false,
            count: 1,
            left: None,
            right: None,
        }
    }

    #[inline]
    fn as_left_deref(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    #[inline]
    fn as_right_deref(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    #[inline]
    fn set_red(&mut self) {
        self.black = false
    }

    #[inline]
    fn set_black(&mut self) {
        self.black = true
    }

    #[inline]
    fn toggle_link(&mut self) {
        self.black = !self.black
    }
}

#[inline]
fn is_red(node: Option<&Node>) -> bool {
    node.map_or(false, |n| !n.black)
}

#[inline]
fn is_black(node: Option<&Node>) -> bool {
    node.map_or(true, |n| n.black)
}

#[inline]
fn count_of(node: &Option<Box<Node>>) -> usize {
    node.as_ref().map_or(0, |n| n.count)
}

#[inline]
fn update_count(node: &mut Node) {
    node.count = node.rows.len() + count_of(&node.left) + count_of(&node.right);
}

/// Ordered countable index store.
pub struct OrderedIndex {
    root: Option<Box<Node>>,
    entries: usize,
}

impl Default for OrderedIndex {
    fn default() -> OrderedIndex {
        OrderedIndex::new()
    }
}

impl OrderedIndex {
    pub fn new() -> OrderedIndex {
        OrderedIndex {
            root: None,
            entries: 0,
        }
    }

    /// Total row entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.entries = 0;
    }

    /// Insert a row under `key`. With `unique`, a second row under an
    /// existing key raises [crate::Error::ConstraintFail].
    pub fn insert(&mut self, key: KeyTuple, row: RowId, unique: bool) -> Result<()> {
        let (root, res) = Self::upsert(self.root.take(), key, row, unique);
        self.root = root;
        if let Some(node) = self.root.as_mut() {
            node.set_black();
        }
        res?;
        self.entries += 1;
        Ok(())
    }

    fn upsert(
        node: Option<Box<Node>>,
        key: KeyTuple,
        row: RowId,
        unique: bool,
    ) -> (Option<Box<Node>>, Result<()>) {
        let mut node = match node {
            None => return (Some(Box::new(Node::new(key, row))), Ok(())),
            Some(node) => node,
        };
        match key.cmp(&node.key) {
            Ordering::Less => {
                let (left, res) = Self::upsert(node.left.take(), key, row, unique);
                node.left = left;
                if res.is_err() {
                    return (Some(node), res);
                }
                update_count(&mut node);
                (Some(Self::walkuprot_23(node)), Ok(()))
            }
            Ordering::Greater => {
                let (right, res) = Self::upsert(node.right.take(), key, row, unique);
                node.right = right;
                if res.is_err() {
                    return (Some(node), res);
                }
                update_count(&mut node);
                (Some(Self::walkuprot_23(node)), Ok(()))
            }
            Ordering::Equal if unique => {
                let res = err_at!(ConstraintFail, msg: "duplicate key {:?}", node.key);
                (Some(node), res)
            }
            Ordering::Equal => {
                node.rows.push(row);
                node.count += 1;
                (Some(node), Ok(()))
            }
        }
    }

    /// Remove `row` under `key`. Returns false when the pair is not in
    /// the index.
    pub fn remove(&mut self, key: &KeyTuple, row: RowId) -> Result<bool> {
        let (n_rows, present) = match self.get_node(key) {
            None => return Ok(false),
            Some(node) => (node.rows.len(), node.rows.contains(&row)),
        };
        if !present {
            return Ok(false);
        }

        if n_rows > 1 {
            match self.root.as_mut() {
                Some(root) => Self::remove_row_in_place(root, key, row),
                None => return Ok(false),
            };
        } else {
            let (root, deleted) = Self::do_delete(self.root.take(), key);
            self.root = root;
            if deleted.is_none() {
                return err_at!(Fatal, msg: "delete lost key {:?}", key);
            }
            if let Some(node) = self.root.as_mut() {
                node.set_black();
            }
        }
        self.entries -= 1;
        Ok(true)
    }

    // Multi-row node keeps its place in the tree; only the row vector
    // and ancestor counts change.
    fn remove_row_in_place(node: &mut Box<Node>, key: &KeyTuple, row: RowId) -> bool {
        match key.cmp(&node.key) {
            Ordering::Less => match node.left.as_mut() {
                Some(left) => {
                    let removed = Self::remove_row_in_place(left, key, row);
                    if removed {
                        node.count -= 1;
                    }
                    removed
                }
                None => false,
            },
            Ordering::Greater => match node.right.as_mut() {
                Some(right) => {
                    let removed = Self::remove_row_in_place(right, key, row);
                    if removed {
                        node.count -= 1;
                    }
                    removed
                }
                None => false,
            },
            Ordering::Equal => match node.rows.iter().position(|r| *r == row) {
                Some(at) => {
                    node.rows.remove(at);
                    node.count -= 1;
                    true
                }
                None => false,
            },
        }
    }

    fn do_delete(node: Option<Box<Node>>, key: &KeyTuple) -> (Option<Box<Node>>, Option<Box<Node>>) {
        let mut node = match node {
            None => return (None, None),
            Some(node) => node,
        };

        if node.key.cmp(key) == Ordering::Greater {
            if node.left.is_none() {
                return (Some(node), None);
            }
            let ok = !is_red(node.as_left_deref());
            if ok && !is_red(node.left.as_ref().map_or(None, |n| n.as_left_deref())) {
                node = Self::move_red_left(node);
            }
            let (left, deleted) = Self::do_delete(node.left.take(), key);
            node.left = left;
            update_count(&mut node);
            (Some(Self::fixup(node)), deleted)
        } else {
            if is_red(node.as_left_deref()) {
                node = Self::rotate_right(node);
            }

            if node.key.cmp(key) == Ordering::Equal && node.right.is_none() {
                return (node.left.take(), Some(node));
            }

            let ok = node.right.is_some() && !is_red(node.as_right_deref());
            if ok && !is_red(node.right.as_ref().map_or(None, |n| n.as_left_deref())) {
                node = Self::move_red_right(node);
            }

            if node.key.cmp(key) == Ordering::Equal {
                // replace with the successor pulled from the right arm.
                let (right, successor) = Self::delete_min(node.right.take());
                node.right = right;
                let mut successor = match successor {
                    Some(successor) => successor,
                    None => return (Some(node), None),
                };
                successor.left = node.left.take();
                successor.right = node.right.take();
                successor.black = node.black;
                update_count(&mut successor);
                (Some(Self::fixup(successor)), Some(node))
            } else {
                let (right, deleted) = Self::do_delete(node.right.take(), key);
                node.right = right;
                update_count(&mut node);
                (Some(Self::fixup(node)), deleted)
            }
        }
    }

    fn delete_min(node: Option<Box<Node>>) -> (Option<Box<Node>>, Option<Box<Node>>) {
        let mut node = match node {
            None => return (None, None),
            Some(node) => node,
        };
        if node.left.is_none() {
            return (None, Some(node));
        }
        let left = node.as_left_deref();
        if !is_red(left) && !is_red(left.map_or(None, |n| n.as_left_deref())) {
            node = Self::move_red_left(node);
        }
        let (left, deleted) = Self::delete_min(node.left.take());
        node.left = left;
        update_count(&mut node);
        (Some(Self::fixup(node)), deleted)
    }

    fn walkuprot_23(mut node: Box<Node>) -> Box<Node> {
        if is_red(node.as_right_deref()) && !is_red(node.as_left_deref()) {
            node = Self::rotate_left(node);
        }
        let left = node.as_left_deref();
        if is_red(left) && is_red(left.map_or(None, |n| n.as_left_deref())) {
            node = Self::rotate_right(node);
        }
        if is_red(node.as_left_deref()) && is_red(node.as_right_deref()) {
            Self::flip(&mut node);
        }
        node
    }

    fn rotate_left(mut node: Box<Node>) -> Box<Node> {
        if is_black(node.as_right_deref()) {
            panic!("rotate_left: rotating a black link");
        }
        let mut x = match node.right.take() {
            Some(x) => x,
            None => unreachable!(),
        };
        node.right = x.left.take();
        x.black = node.black;
        node.set_red();
        update_count(&mut node);
        x.left = Some(node);
        update_count(&mut x);
        x
    }

    fn rotate_right(mut node: Box<Node>) -> Box<Node> {
        if is_black(node.as_left_deref()) {
            panic!("rotate_right: rotating a black link");
        }
        let mut x = match node.left.take() {
            Some(x) => x,
            None => unreachable!(),
        };
        node.left = x.right.take();
        x.black = node.black;
        node.set_red();
        update_count(&mut node);
        x.right = Some(node);
        update_count(&mut x);
        x
    }

    fn flip(node: &mut Node) {
        if let Some(left) = node.left.as_mut() {
            left.toggle_link();
        }
        if let Some(right) = node.right.as_mut() {
            right.toggle_link();
        }
        node.toggle_link();
    }

    fn fixup(mut node: Box<Node>) -> Box<Node> {
        if is_red(node.as_right_deref()) {
            node = Self::rotate_left(node);
        }
        let left = node.as_left_deref();
        if is_red(left) && is_red(left.map_or(None, |n| n.as_left_deref())) {
            node = Self::rotate_right(node);
        }
        if is_red(node.as_left_deref()) && is_red(node.as_right_deref()) {
            Self::flip(&mut node);
        }
        node
    }

    fn move_red_left(mut node: Box<Node>) -> Box<Node> {
        Self::flip(&mut node);
        if is_red(node.right.as_ref().map_or(None, |n| n.as_left_deref())) {
            if let Some(right) = node.right.take() {
                node.right = Some(Self::rotate_right(right));
            }
            node = Self::rotate_left(node);
            Self::flip(&mut node);
        }
        node
    }

    fn move_red_right(mut node: Box<Node>) -> Box<Node> {
        Self::flip(&mut node);
        if is_red(node.left.as_ref().map_or(None, |n| n.as_left_deref())) {
            node = Self::rotate_right(node);
            Self::flip(&mut node);
        }
        node
    }

    fn get_node(&self, key: &KeyTuple) -> Option<&Node> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            cur = match key.cmp(&node.key) {
                Ordering::Less => node.as_left_deref(),
                Ordering::Greater => node.as_right_deref(),
                Ordering::Equal => return Some(node),
            };
        }
        None
    }

    /// Row addresses stored under `key`, insertion order.
    pub fn get(&self, key: &KeyTuple) -> Option<&[RowId]> {
        self.get_node(key).map(|n| n.rows.as_slice())
    }

    pub fn has_key(&self, key: &KeyTuple) -> bool {
        self.get_node(key).is_some()
    }

    /// Rank query: row entries whose key orders before `key`
    /// (`inclusive` adds the entries equal to it). O(log n) via the
    /// subtree counts.
    pub fn entries_below(&self, key: &KeyTuple, inclusive: bool) -> usize {
        let mut acc = 0;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            match node.key.cmp(key) {
                Ordering::Less => {
                    acc += count_of(&node.left) + node.rows.len();
                    cur = node.as_right_deref();
                }
                Ordering::Equal => {
                    acc += count_of(&node.left);
                    if inclusive {
                        acc += node.rows.len();
                    }
                    return acc;
                }
                Ordering::Greater => cur = node.as_left_deref(),
            }
        }
        acc
    }

    /// Forward or reverse cursor over the whole index.
    pub fn cursor_all(&self, reverse: bool) -> OrderedCursor {
        let mut cursor = OrderedCursor::new(reverse);
        match reverse {
            false => cursor.push_left_path(self.root.as_deref()),
            true => cursor.push_right_path(self.root.as_deref()),
        }
        cursor
    }

    /// Cursor positioned at the first entry at-or-beyond `key` in scan
    /// direction: GE/GT forward, LE/LT reverse.
    pub fn cursor_from(&self, key: &KeyTuple, inclusive: bool, reverse: bool) -> OrderedCursor {
        let mut cursor = OrderedCursor::new(reverse);
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            let ord = node.key.cmp(key);
            let qualifies = match (reverse, inclusive) {
                (false, true) => ord != Ordering::Less,    // >= key
                (false, false) => ord == Ordering::Greater, // > key
                (true, true) => ord != Ordering::Greater,  // <= key
                (true, false) => ord == Ordering::Less,    // < key
            };
            if qualifies {
                cursor.stack.push(node);
                cur = match reverse {
                    false => node.as_left_deref(),
                    true => node.as_right_deref(),
                };
            } else {
                cur = match reverse {
                    false => node.as_right_deref(),
                    true => node.as_left_deref(),
                };
            }
        }
        cursor
    }

    /// Validate tree invariants: sort order, no consecutive reds, equal
    /// black height on both arms, accurate subtree counts.
    pub fn validate(&self) -> Result<()> {
        if is_red(self.root.as_deref()) {
            return err_at!(Fatal, msg: "root is red");
        }
        Self::validate_tree(self.root.as_deref(), false)?;
        Ok(())
    }

    fn validate_tree(node: Option<&Node>, from_red: bool) -> Result<(usize, usize)> {
        let node = match node {
            None => return Ok((0, 0)),
            Some(node) => node,
        };
        if from_red && !node.black {
            return err_at!(Fatal, msg: "consecutive red links");
        }
        if let Some(left) = node.as_left_deref() {
            if left.key.cmp(&node.key) != Ordering::Less {
                return err_at!(Fatal, msg: "left child out of order");
            }
        }
        if let Some(right) = node.as_right_deref() {
            if right.key.cmp(&node.key) != Ordering::Greater {
                return err_at!(Fatal, msg: "right child out of order");
            }
        }
        let (lb, lc) = Self::validate_tree(node.as_left_deref(), !node.black)?;
        let (rb, rc) = Self::validate_tree(node.as_right_deref(), !node.black)?;
        if lb != rb {
            return err_at!(Fatal, msg: "unbalanced blacks {} {}", lb, rb);
        }
        let count = lc + rc + node.rows.len();
        if count != node.count {
            return err_at!(Fatal, msg: "bad subtree count {} != {}", node.count, count);
        }
        Ok((lb + (node.black as usize), count))
    }
}

/// In-order (or reverse) cursor yielding one row entry at a time.
pub struct OrderedCursor<'a> {
    stack: Vec<&'a Node>,
    row_idx: usize,
    reverse: bool,
}

impl<'a> OrderedCursor<'a> {
    fn new(reverse: bool) -> OrderedCursor<'a> {
        OrderedCursor {
            stack: vec![],
            row_idx: 0,
            reverse,
        }
    }

    fn push_left_path(&mut self, mut node: Option<&'a Node>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.as_left_deref();
        }
    }

    fn push_right_path(&mut self, mut node: Option<&'a Node>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.as_right_deref();
        }
    }

    /// Key of the entry the cursor would yield next.
    pub fn peek_key(&self) -> Option<&'a KeyTuple> {
        self.stack.last().map(|n| &n.key)
    }

    pub fn next_entry(&mut self) -> Option<(&'a KeyTuple, RowId)> {
        loop {
            let node = *self.stack.last()?;
            if self.row_idx < node.rows.len() {
                let row = node.rows[self.row_idx];
                self.row_idx += 1;
                return Some((&node.key, row));
            }
            self.stack.pop();
            self.row_idx = 0;
            match self.reverse {
                false => {
                    let right = node.as_right_deref();
                    self.push_left_path(right);
                }
                true => {
                    let left = node.as_left_deref();
                    self.push_right_path(left);
                }
            }
        }
    }
}

impl<'a> Iterator for OrderedCursor<'a> {
    type Item = (&'a KeyTuple, RowId);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}

#[cfg(test)]
#[path = "ordered_test.rs"]
mod ordered_test;
