use alloc::alloc::Layout;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use thiserror::Error;

pub type CursorResult<T> = Result<T, CursorError>;

/// a node or its payload could not be allocated. the list is left untouched
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to allocate a node for a {size} byte payload")]
pub struct AllocError {
    /// size of the payload that was being copied
    pub size: usize,
}

/// a traversal step would have moved past the first or last element
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cursor is at the boundary of its traversal")]
pub struct AtBoundary;

/// the operation has no meaning for the cursor's current state
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation is undefined for a cursor that is not positioned on an element")]
pub struct InvalidState;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
}

type Link = Option<NonNull<Node>>;

/// a doubly-linked list of byte payloads. every payload is copied in when it
/// is inserted and owned by the list until its node is deleted or the list is
/// dropped.
///
/// the list itself only grows at its ends; positional inserts and deletes go
/// through a [`CursorMut`]
pub struct List {
    head: Link,
    tail: Link,
    /// the number of live nodes
    len: usize,
    _owns: PhantomData<Box<Node>>,
}

impl List {
    /// create a new, empty list
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _owns: PhantomData,
        }
    }

    /// get the number of elements in the list
    pub fn len(&self) -> usize {
        self.len
    }

    /// returns true if the length of the list is 0
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// the payload of the structural head, or None if the list is empty
    pub fn front(&self) -> Option<&[u8]> {
        // SAFETY: nodes reachable from the list live as long as the borrow of it
        self.head.map(|node| unsafe { &*node.as_ptr() }.payload.as_slice())
    }

    /// the payload of the structural tail, or None if the list is empty
    pub fn back(&self) -> Option<&[u8]> {
        // SAFETY: nodes reachable from the list live as long as the borrow of it
        self.tail.map(|node| unsafe { &*node.as_ptr() }.payload.as_slice())
    }

    /// copy `bytes` into a new node at the tail of the list
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        let node = Node::alloc(bytes)?;
        // SAFETY: `node` is fresh and the tail has no successor
        unsafe { self.link_between(self.tail, None, node) };
        Ok(())
    }

    /// copy `bytes` into a new node at the head of the list
    pub fn prepend(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        let node = Node::alloc(bytes)?;
        // SAFETY: `node` is fresh and the head has no predecessor
        unsafe { self.link_between(None, self.head, node) };
        Ok(())
    }

    /// release every node, leaving an empty list that can be reused
    pub fn clear(&mut self) {
        while let Some(head) = self.head {
            // SAFETY: `head` is a live node owned by this list
            drop(unsafe { self.unlink(head) });
        }
    }

    /// return an iterator over the payloads in structural order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            front: self.head,
            back: self.tail,
            remaining: self.len,
            _list: PhantomData,
        }
    }

    /// a read-only cursor walking head to tail, positioned before the head
    pub fn forward_cursor(&self) -> Cursor<'_> {
        Cursor::new(self, Direction::Forward)
    }

    /// a read-only cursor walking tail to head, positioned before the tail
    pub fn backward_cursor(&self) -> Cursor<'_> {
        Cursor::new(self, Direction::Backward)
    }

    /// a mutating cursor walking head to tail, positioned before the head
    pub fn forward_cursor_mut(&mut self) -> CursorMut<'_> {
        CursorMut::new(self, Direction::Forward)
    }

    /// a mutating cursor walking tail to head, positioned before the tail
    pub fn backward_cursor_mut(&mut self) -> CursorMut<'_> {
        CursorMut::new(self, Direction::Backward)
    }

    /// link `node` between two structurally adjacent neighbors. a missing
    /// neighbor means `node` becomes the head or tail respectively.
    ///
    /// # Safety
    /// `node` must be unlinked and owned by nobody else, and `prev`/`next`
    /// must be adjacent nodes of this list (or the matching boundary)
    // Before: (prev) <-> (next)
    // After: (prev) <-> (node) <-> (next)
    unsafe fn link_between(&mut self, prev: Link, next: Link, node: NonNull<Node>) {
        (*node.as_ptr()).prev = prev;
        (*node.as_ptr()).next = next;

        match prev {
            Some(prev) => (*prev.as_ptr()).next = Some(node),
            None => self.head = Some(node),
        }
        match next {
            Some(next) => (*next.as_ptr()).prev = Some(node),
            None => self.tail = Some(node),
        }

        self.len += 1;
    }

    /// splice `node` out of the list and reclaim it. the returned node still
    /// carries the links it had, so callers can tell where it used to be.
    ///
    /// # Safety
    /// `node` must be a live node of this list
    unsafe fn unlink(&mut self, node: NonNull<Node>) -> Node {
        let prev = (*node.as_ptr()).prev;
        let next = (*node.as_ptr()).next;

        match prev {
            Some(prev) => (*prev.as_ptr()).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => (*next.as_ptr()).prev = prev,
            None => self.tail = prev,
        }

        self.len -= 1;
        Node::free(node)
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for List {
    fn drop(&mut self) {
        self.clear();
    }
}

// SAFETY: the list owns every node and payload outright, nothing is shared
unsafe impl Send for List {}
unsafe impl Sync for List {}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a [u8];
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// a link in the chain, owning a copy of the bytes it was created from
struct Node {
    payload: Vec<u8>,
    prev: Link,
    next: Link,
}

impl Node {
    /// copy `bytes` into a freshly allocated node with no links
    fn alloc(bytes: &[u8]) -> Result<NonNull<Node>, AllocError> {
        let err = AllocError { size: bytes.len() };

        let mut payload = Vec::new();
        payload.try_reserve_exact(bytes.len()).map_err(|_| err)?;
        payload.extend_from_slice(bytes);

        // SAFETY: Node is never zero-sized
        let raw = unsafe { alloc::alloc::alloc(Layout::new::<Node>()) }.cast::<Node>();
        let node = NonNull::new(raw).ok_or(err)?;
        // SAFETY: `node` points at fresh memory laid out for a Node
        unsafe {
            node.as_ptr().write(Node {
                payload,
                prev: None,
                next: None,
            })
        };
        Ok(node)
    }

    /// # Safety
    /// `node` must come from [`Node::alloc`], be unlinked and never be used again
    unsafe fn free(node: NonNull<Node>) -> Node {
        *Box::from_raw(node.as_ptr())
    }
}

pub struct Iter<'a> {
    front: Link,
    back: Link,
    remaining: usize,
    _list: PhantomData<&'a List>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.front.map(|node| {
            // SAFETY: the list is borrowed for 'a and `remaining` keeps us inside it
            let node = unsafe { &*node.as_ptr() };
            self.front = node.next;
            self.remaining -= 1;
            node.payload.as_slice()
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.back.map(|node| {
            // SAFETY: the list is borrowed for 'a and `remaining` keeps us inside it
            let node = unsafe { &*node.as_ptr() };
            self.back = node.prev;
            self.remaining -= 1;
            node.payload.as_slice()
        })
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// the order a cursor visits elements in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// head to tail
    Forward,
    /// tail to head
    Backward,
}

impl Direction {
    /// the structural neighbor a traversal step moves onto
    fn ahead(self, node: &Node) -> Link {
        match self {
            Self::Forward => node.next,
            Self::Backward => node.prev,
        }
    }

    /// the structural neighbor a step back moves onto
    fn behind(self, node: &Node) -> Link {
        match self {
            Self::Forward => node.prev,
            Self::Backward => node.next,
        }
    }
}

/// where a cursor is. `Pristine` sits logically before its anchor: the first
/// `next` lands on the anchor without moving
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    /// pristine over a list with no nodes
    Empty,
    Pristine(NonNull<Node>),
    At(NonNull<Node>),
}

impl Position {
    fn anchored_at(node: Link) -> Self {
        node.map_or(Self::Empty, Self::Pristine)
    }

    fn current(self) -> Link {
        match self {
            Self::At(node) => Some(node),
            Self::Empty | Self::Pristine(_) => None,
        }
    }

    /// # Safety
    /// a positioned node must still be alive
    unsafe fn advance(&mut self, direction: Direction) -> Result<(), AtBoundary> {
        match *self {
            Self::Empty => Err(AtBoundary),
            Self::Pristine(anchor) => {
                *self = Self::At(anchor);
                Ok(())
            }
            Self::At(node) => {
                let ahead = direction.ahead(node.as_ref()).ok_or(AtBoundary)?;
                *self = Self::At(ahead);
                Ok(())
            }
        }
    }

    /// # Safety
    /// a positioned node must still be alive
    unsafe fn retreat(&mut self, direction: Direction) -> Result<(), AtBoundary> {
        match *self {
            Self::Empty | Self::Pristine(_) => Err(AtBoundary),
            Self::At(node) => {
                let behind = direction.behind(node.as_ref()).ok_or(AtBoundary)?;
                *self = Self::At(behind);
                Ok(())
            }
        }
    }
}

/// a read-only cursor. any number of these may walk a list at the same time
#[derive(Clone)]
pub struct Cursor<'a> {
    list: &'a List,
    direction: Direction,
    position: Position,
}

/// a cursor that can insert and delete around its position. it holds the
/// list exclusively, so it is the only handle touching the list while it
/// lives
pub struct CursorMut<'a> {
    list: &'a mut List,
    direction: Direction,
    position: Position,
}

macro_rules! impl_traversal {
    ($cursor:ident) => {
        impl<'a> $cursor<'a> {
            /// the direction this cursor was created with
            pub fn direction(&self) -> Direction {
                self.direction
            }

            /// true until the first successful `next`. a cursor over an empty
            /// list is always pristine
            pub fn is_pristine(&self) -> bool {
                !matches!(self.position, Position::At(_))
            }

            /// number of elements in the bound list
            pub fn len(&self) -> usize {
                self.list.len()
            }

            pub fn is_empty(&self) -> bool {
                self.list.is_empty()
            }

            /// move one element forward in traversal order. a pristine cursor
            /// lands on its anchor; at the last element the cursor stays put
            #[allow(clippy::should_implement_trait)]
            pub fn next(&mut self) -> Result<(), AtBoundary> {
                // SAFETY: the bound list keeps every positioned node alive
                unsafe { self.position.advance(self.direction) }
            }

            /// move one element backward in traversal order. always fails
            /// while pristine
            pub fn previous(&mut self) -> Result<(), AtBoundary> {
                // SAFETY: the bound list keeps every positioned node alive
                unsafe { self.position.retreat(self.direction) }
            }
        }

        impl fmt::Debug for $cursor<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($cursor))
                    .field("direction", &self.direction)
                    .field("pristine", &self.is_pristine())
                    .field("current", &self.get())
                    .field("len", &self.list.len())
                    .finish()
            }
        }
    };
}

impl_traversal!(Cursor);
impl_traversal!(CursorMut);

impl<'a> Cursor<'a> {
    fn new(list: &'a List, direction: Direction) -> Self {
        let anchor = match direction {
            Direction::Forward => list.head,
            Direction::Backward => list.tail,
        };
        Self {
            list,
            direction,
            position: Position::anchored_at(anchor),
        }
    }

    /// the payload at the cursor, or None while pristine
    pub fn get(&self) -> Option<&'a [u8]> {
        // SAFETY: the list is shared for 'a, so no node can be freed or changed
        self.position
            .current()
            .map(|node| unsafe { &*node.as_ptr() }.payload.as_slice())
    }
}

impl<'a> CursorMut<'a> {
    fn new(list: &'a mut List, direction: Direction) -> Self {
        let anchor = match direction {
            Direction::Forward => list.head,
            Direction::Backward => list.tail,
        };
        Self {
            list,
            direction,
            position: Position::anchored_at(anchor),
        }
    }

    /// the payload at the cursor, or None while pristine
    pub fn get(&self) -> Option<&[u8]> {
        // SAFETY: the list is exclusively ours and `&self` blocks mutation
        self.position
            .current()
            .map(|node| unsafe { &*node.as_ptr() }.payload.as_slice())
    }

    /// the payload at the cursor, mutable in place. its size is fixed
    pub fn get_mut(&mut self) -> Option<&mut [u8]> {
        // SAFETY: the list is exclusively ours and `&mut self` is unique
        self.position
            .current()
            .map(|node| unsafe { &mut (*node.as_ptr()).payload }.as_mut_slice())
    }

    /// a read-only view of this cursor at its current position
    pub fn as_cursor(&self) -> Cursor<'_> {
        Cursor {
            list: &*self.list,
            direction: self.direction,
            position: self.position,
        }
    }

    /// the bound list, read-only
    pub fn as_list(&self) -> &List {
        &*self.list
    }

    /// copy `bytes` into a node right after the cursor in traversal order.
    ///
    /// while pristine the node goes in front of the anchor and becomes the
    /// new anchor, so the cursor still has not visited anything. over an
    /// empty list the node becomes the only element. otherwise the cursor
    /// does not move
    pub fn insert_after(&mut self, bytes: &[u8]) -> CursorResult<()> {
        let node = Node::alloc(bytes)?;

        // SAFETY: `node` is fresh and every positioned node belongs to our list
        match self.position {
            Position::Empty => {
                unsafe { self.list.link_between(None, None, node) };
                self.position = Position::Pristine(node);
            }
            Position::Pristine(anchor) => {
                unsafe { self.link_behind(anchor, node) };
                self.position = Position::Pristine(node);
            }
            Position::At(curr) => unsafe { self.link_ahead(curr, node) },
        }

        Ok(())
    }

    /// copy `bytes` into a node right before the cursor in traversal order.
    /// fails while pristine, as nothing comes before the start. over an empty
    /// list the node becomes the only element. the cursor does not move
    pub fn insert_before(&mut self, bytes: &[u8]) -> CursorResult<()> {
        let curr = match self.position {
            Position::Pristine(_) => return Err(InvalidState.into()),
            Position::Empty => None,
            Position::At(curr) => Some(curr),
        };

        let node = Node::alloc(bytes)?;

        // SAFETY: `node` is fresh and `curr` belongs to our list
        match curr {
            Some(curr) => unsafe { self.link_behind(curr, node) },
            None => {
                unsafe { self.list.link_between(None, None, node) };
                self.position = Position::Pristine(node);
            }
        }

        Ok(())
    }

    /// remove the element under the cursor and hand back its payload.
    ///
    /// removing the head re-anchors a pristine cursor on the new head.
    /// removing the tail leaves the cursor on the old tail's predecessor.
    /// removing anything else leaves the cursor on the element before it in
    /// traversal order, so the next `next` yields the element after it
    pub fn delete_current(&mut self) -> Result<Vec<u8>, InvalidState> {
        let curr = self.position.current().ok_or(InvalidState)?;

        // SAFETY: `curr` is positioned, so it is a live node of our list
        let removed = unsafe { self.list.unlink(curr) };

        self.position = match (removed.prev, removed.next) {
            (None, None) => Position::Empty,
            (None, Some(next)) => Position::Pristine(next),
            (Some(prev), None) => Position::At(prev),
            (Some(prev), Some(next)) => match self.direction {
                Direction::Forward => Position::At(prev),
                Direction::Backward => Position::At(next),
            },
        };

        Ok(removed.payload)
    }

    /// # Safety
    /// `curr` must be a live node of our list and `node` must be fresh
    unsafe fn link_ahead(&mut self, curr: NonNull<Node>, node: NonNull<Node>) {
        let (prev, next) = {
            let curr = curr.as_ref();
            (curr.prev, curr.next)
        };
        match self.direction {
            Direction::Forward => self.list.link_between(Some(curr), next, node),
            Direction::Backward => self.list.link_between(prev, Some(curr), node),
        }
    }

    /// # Safety
    /// `curr` must be a live node of our list and `node` must be fresh
    unsafe fn link_behind(&mut self, curr: NonNull<Node>, node: NonNull<Node>) {
        let (prev, next) = {
            let curr = curr.as_ref();
            (curr.prev, curr.next)
        };
        match self.direction {
            Direction::Forward => self.list.link_between(prev, Some(curr), node),
            Direction::Backward => self.list.link_between(Some(curr), next, node),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lists_are_sendable() {
        fn send<S: Send>(_: S) {}
        send(List::new());
    }

    #[test]
    fn new_list_is_empty() {
        let ll = List::new();
        assert_eq!(ll.len(), 0);
        assert!(ll.is_empty());
        assert!(ll.front().is_none());
        assert!(ll.back().is_none());
        assert!(ll.iter().next().is_none());
    }

    #[test]
    fn can_append() {
        let mut ll = List::new();
        ll.append(b"foo").expect("failed to append");
        assert_eq!(ll.len(), 1);
        ll.append(b"bar").expect("failed to append");
        assert_eq!(ll.len(), 2);
        assert_eq!(ll.front(), Some(&b"foo"[..]));
        assert_eq!(ll.back(), Some(&b"bar"[..]));
    }

    #[test]
    fn can_prepend() {
        let mut ll = List::new();
        ll.prepend(b"foo").expect("failed to prepend");
        assert_eq!(ll.len(), 1);
        ll.prepend(b"bar").expect("failed to prepend");
        assert_eq!(ll.len(), 2);
        assert_eq!(ll.front(), Some(&b"bar"[..]));
        assert_eq!(ll.back(), Some(&b"foo"[..]));
    }

    #[test]
    fn single_element_is_both_head_and_tail() {
        let mut ll = List::new();
        ll.append(b"only").expect("failed to append");
        assert_eq!(ll.front(), ll.back());
    }

    #[test]
    fn payloads_are_copied_on_insert() {
        let mut ll = List::new();
        let mut buf = *b"foo";
        ll.append(&buf).expect("failed to append");
        buf[0] = b'g';
        assert_eq!(ll.front(), Some(&b"foo"[..]));
    }

    #[test]
    fn empty_payloads_are_stored() {
        let mut ll = List::new();
        ll.append(b"").expect("failed to append");
        assert_eq!(ll.len(), 1);
        assert_eq!(ll.front(), Some(&b""[..]));
    }

    #[test]
    fn iter_walks_both_ends() {
        let mut ll = List::new();
        ll.append(b"b").unwrap();
        ll.prepend(b"a").unwrap();
        ll.append(b"c").unwrap();

        let forward: Vec<&[u8]> = ll.iter().collect();
        assert_eq!(forward, [&b"a"[..], b"b", b"c"]);

        let backward: Vec<&[u8]> = ll.iter().rev().collect();
        assert_eq!(backward, [&b"c"[..], b"b", b"a"]);

        let mut iter = ll.iter();
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next(), Some(&b"a"[..]));
        assert_eq!(iter.next_back(), Some(&b"c"[..]));
        assert_eq!(iter.next(), Some(&b"b"[..]));
        assert!(iter.next().is_none());
        assert!(iter.next_back().is_none());
    }

    #[test]
    fn clear_leaves_a_reusable_list() {
        let mut ll = List::new();
        for i in 0..10u8 {
            ll.append(&[i]).unwrap();
        }
        ll.clear();
        assert!(ll.is_empty());
        assert!(ll.front().is_none());
        assert!(ll.back().is_none());

        ll.append(b"again").unwrap();
        assert_eq!(ll.len(), 1);
        assert_eq!(ll.front(), Some(&b"again"[..]));
    }

    #[test]
    fn debug_lists_payloads() {
        let mut ll = List::new();
        ll.append(&[1, 2]).unwrap();
        ll.append(&[3]).unwrap();
        assert_eq!(format!("{:?}", ll), "[[1, 2], [3]]");
    }

    #[test]
    fn errors_render_messages() {
        let err = CursorError::from(AllocError { size: 12 });
        assert_eq!(
            err.to_string(),
            "failed to allocate a node for a 12 byte payload"
        );
        assert_eq!(
            AtBoundary.to_string(),
            "cursor is at the boundary of its traversal"
        );
        assert_eq!(
            CursorError::from(InvalidState),
            CursorError::InvalidState(InvalidState)
        );
    }
}


// proptest doesn't run under miri with default config
#[cfg(all(not(miri), test))]
mod proptests {
    use std::collections::{HashSet, VecDeque};

    use proptest::collection::vec;
    use proptest::prelude::*;
    use proptest::test_runner::Config;
    use proptest_derive::Arbitrary;
    use proptest_state_machine::{ReferenceStateMachine, StateMachineTest};
    use rand::Rng;

    use super::*;

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::Forward), Just(Direction::Backward)]
    }

    fn payload() -> impl Strategy<Value = Vec<u8>> {
        vec(any::<u8>(), 0..8)
    }

    /// walk the list every way it can be walked and compare against `expected`
    fn assert_linked(ll: &List, expected: &[Vec<u8>]) {
        assert_eq!(ll.len(), expected.len());
        assert_eq!(ll.is_empty(), expected.is_empty());
        assert_eq!(ll.front(), expected.first().map(Vec::as_slice));
        assert_eq!(ll.back(), expected.last().map(Vec::as_slice));

        let iterated: Vec<&[u8]> = ll.iter().collect();
        assert_eq!(iterated, expected.iter().map(Vec::as_slice).collect::<Vec<_>>());
        let reversed: Vec<&[u8]> = ll.iter().rev().collect();
        assert_eq!(
            reversed,
            expected.iter().rev().map(Vec::as_slice).collect::<Vec<_>>()
        );

        let mut cursor = ll.forward_cursor();
        for item in expected {
            cursor.next().expect("forward walk ended early");
            assert_eq!(cursor.get(), Some(item.as_slice()));
        }
        assert!(cursor.next().is_err());

        let mut cursor = ll.backward_cursor();
        for item in expected.iter().rev() {
            cursor.next().expect("backward walk ended early");
            assert_eq!(cursor.get(), Some(item.as_slice()));
        }
        assert!(cursor.next().is_err());
    }

    /// where the reference cursor is, as a structural index
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum ModelPosition {
        Empty,
        Pristine(usize),
        At(usize),
    }

    /// a Vec-backed cursor with the same contract as `CursorMut`
    #[derive(Debug)]
    struct ModelCursor {
        items: Vec<Vec<u8>>,
        direction: Direction,
        position: ModelPosition,
    }

    impl ModelCursor {
        fn new(items: Vec<Vec<u8>>, direction: Direction) -> Self {
            let position = match (items.len(), direction) {
                (0, _) => ModelPosition::Empty,
                (_, Direction::Forward) => ModelPosition::Pristine(0),
                (len, Direction::Backward) => ModelPosition::Pristine(len - 1),
            };
            Self {
                items,
                direction,
                position,
            }
        }

        fn ahead(&self, i: usize) -> Option<usize> {
            match self.direction {
                Direction::Forward => Some(i + 1).filter(|&j| j < self.items.len()),
                Direction::Backward => i.checked_sub(1),
            }
        }

        fn behind(&self, i: usize) -> Option<usize> {
            match self.direction {
                Direction::Forward => i.checked_sub(1),
                Direction::Backward => Some(i + 1).filter(|&j| j < self.items.len()),
            }
        }

        fn get(&self) -> Option<&[u8]> {
            match self.position {
                ModelPosition::At(i) => Some(self.items[i].as_slice()),
                _ => None,
            }
        }

        fn next(&mut self) -> bool {
            let next = match self.position {
                ModelPosition::Empty => None,
                ModelPosition::Pristine(i) => Some(i),
                ModelPosition::At(i) => self.ahead(i),
            };
            next.map(|i| self.position = ModelPosition::At(i)).is_some()
        }

        fn previous(&mut self) -> bool {
            let previous = match self.position {
                ModelPosition::At(i) => self.behind(i),
                _ => None,
            };
            previous
                .map(|i| self.position = ModelPosition::At(i))
                .is_some()
        }

        fn insert_after(&mut self, payload: Vec<u8>) {
            self.position = match (self.position, self.direction) {
                (ModelPosition::Empty, _) => {
                    self.items.push(payload);
                    ModelPosition::Pristine(0)
                }
                (ModelPosition::Pristine(i), Direction::Forward) => {
                    self.items.insert(i, payload);
                    ModelPosition::Pristine(i)
                }
                (ModelPosition::Pristine(i), Direction::Backward) => {
                    self.items.insert(i + 1, payload);
                    ModelPosition::Pristine(i + 1)
                }
                (ModelPosition::At(i), Direction::Forward) => {
                    self.items.insert(i + 1, payload);
                    ModelPosition::At(i)
                }
                (ModelPosition::At(i), Direction::Backward) => {
                    self.items.insert(i, payload);
                    ModelPosition::At(i + 1)
                }
            };
        }

        fn insert_before(&mut self, payload: Vec<u8>) -> bool {
            self.position = match (self.position, self.direction) {
                (ModelPosition::Pristine(_), _) => return false,
                (ModelPosition::Empty, _) => {
                    self.items.push(payload);
                    ModelPosition::Pristine(0)
                }
                (ModelPosition::At(i), Direction::Forward) => {
                    self.items.insert(i, payload);
                    ModelPosition::At(i + 1)
                }
                (ModelPosition::At(i), Direction::Backward) => {
                    self.items.insert(i + 1, payload);
                    ModelPosition::At(i)
                }
            };
            true
        }

        fn delete_current(&mut self) -> Option<Vec<u8>> {
            let ModelPosition::At(i) = self.position else {
                return None;
            };
            let len = self.items.len();
            let removed = self.items.remove(i);
            self.position = if len == 1 {
                ModelPosition::Empty
            } else if i == 0 {
                ModelPosition::Pristine(0)
            } else if i == len - 1 {
                ModelPosition::At(i - 1)
            } else {
                match self.direction {
                    Direction::Forward => ModelPosition::At(i - 1),
                    Direction::Backward => ModelPosition::At(i),
                }
            };
            Some(removed)
        }
    }

    #[derive(Arbitrary, Clone, Debug)]
    enum Operation {
        Next,
        Previous,
        InsertAfter(Vec<u8>),
        InsertBefore(Vec<u8>),
        DeleteCurrent,
    }

    proptest! {
        #[test]
        fn cursor_matches_reference_model(
            initial in vec(payload(), 0..8),
            direction in direction(),
            ops in vec(any::<Operation>(), 0..256),
        ) {
            let mut ll = List::new();
            for item in &initial {
                ll.append(item).unwrap();
            }

            let mut model = ModelCursor::new(initial, direction);
            let mut cursor = match direction {
                Direction::Forward => ll.forward_cursor_mut(),
                Direction::Backward => ll.backward_cursor_mut(),
            };

            for op in ops {
                match op {
                    Operation::Next => prop_assert_eq!(cursor.next().is_ok(), model.next()),
                    Operation::Previous => {
                        prop_assert_eq!(cursor.previous().is_ok(), model.previous())
                    }
                    Operation::InsertAfter(payload) => {
                        cursor.insert_after(&payload).unwrap();
                        model.insert_after(payload);
                    }
                    Operation::InsertBefore(payload) => {
                        let inserted = cursor.insert_before(&payload);
                        prop_assert_eq!(inserted.is_ok(), model.insert_before(payload));
                    }
                    Operation::DeleteCurrent => {
                        prop_assert_eq!(cursor.delete_current().ok(), model.delete_current());
                    }
                }
                prop_assert_eq!(cursor.get(), model.get());
                prop_assert_eq!(cursor.is_pristine(), !matches!(model.position, ModelPosition::At(_)));
                prop_assert_eq!(cursor.len(), model.items.len());
            }

            drop(cursor);
            assert_linked(&ll, &model.items);
        }

        #[test]
        fn delete_current_keeps_every_other_node_reachable(
            items in vec(payload(), 1..16),
            target in any::<prop::sample::Index>(),
            direction in direction(),
        ) {
            // tag every payload so duplicates would show up
            let items: Vec<Vec<u8>> = items
                .into_iter()
                .enumerate()
                .map(|(i, mut item)| { item.insert(0, i as u8); item })
                .collect();
            let mut ll = List::new();
            for item in &items {
                ll.append(item).unwrap();
            }

            let steps = target.index(items.len()) + 1;
            let mut cursor = match direction {
                Direction::Forward => ll.forward_cursor_mut(),
                Direction::Backward => ll.backward_cursor_mut(),
            };
            for _ in 0..steps {
                cursor.next().unwrap();
            }
            let removed = cursor.delete_current().unwrap();
            drop(cursor);

            let mut expected = items.clone();
            let at = expected.iter().position(|item| *item == removed).unwrap();
            expected.remove(at);

            prop_assert_eq!(ll.len(), items.len() - 1);
            let seen: HashSet<&[u8]> = ll.iter().collect();
            prop_assert_eq!(seen.len(), ll.len());
            assert_linked(&ll, &expected);
        }

        #[test]
        fn pristine_insert_after_reverses_its_inputs(
            original in vec(payload(), 0..4),
            inserted in vec(payload(), 1..8),
        ) {
            let mut ll = List::new();
            for item in &original {
                ll.append(item).unwrap();
            }
            let mut cursor = ll.forward_cursor_mut();
            for item in &inserted {
                cursor.insert_after(item).unwrap();
            }
            drop(cursor);

            let expected: Vec<Vec<u8>> = inserted
                .iter()
                .rev()
                .chain(original.iter())
                .cloned()
                .collect();
            assert_linked(&ll, &expected);
        }
    }

    #[test]
    #[ignore]
    fn longform_random_deletes() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let len = rng.gen_range(1..256usize);
            let mut expected: Vec<Vec<u8>> =
                (0..len).map(|i| (i as u32).to_le_bytes().to_vec()).collect();
            let mut ll = List::new();
            for item in &expected {
                ll.append(item).unwrap();
            }

            while !expected.is_empty() {
                let target = rng.gen_range(0..expected.len());
                let mut cursor = ll.forward_cursor_mut();
                for _ in 0..=target {
                    cursor.next().unwrap();
                }
                assert_eq!(cursor.delete_current(), Ok(expected.remove(target)));
                drop(cursor);
                assert_linked(&ll, &expected);
            }
        }
    }

    // Setup the state machine test using the `prop_state_machine!` macro
    proptest_state_machine::prop_state_machine! {
        #![proptest_config(Config {
            failure_persistence: None,
            .. Config::default()
        })]

        #[test]
        fn list_state_machine_test(
            sequential
            1..200
            =>
            List
        );
    }

    /// list-level transitions, positional ones driven through a fresh cursor
    #[derive(Clone, Debug)]
    pub enum Transition {
        Append(Vec<u8>),
        Prepend(Vec<u8>),
        InsertAfterNth(usize, Vec<u8>),
        InsertBeforeNth(usize, Vec<u8>),
        DeleteNth(usize),
        Clear,
    }

    pub struct ListStateMachine;

    impl ReferenceStateMachine for ListStateMachine {
        type State = VecDeque<Vec<u8>>;
        type Transition = Transition;

        fn init_state() -> BoxedStrategy<Self::State> {
            Just(VecDeque::new()).boxed()
        }

        fn transitions(state: &Self::State) -> BoxedStrategy<Self::Transition> {
            if state.is_empty() {
                return prop_oneof![
                    payload().prop_map(Transition::Append),
                    payload().prop_map(Transition::Prepend),
                ]
                .boxed();
            }

            let len = state.len();
            prop_oneof![
                2 => payload().prop_map(Transition::Append),
                2 => payload().prop_map(Transition::Prepend),
                2 => (0..len, payload()).prop_map(|(i, p)| Transition::InsertAfterNth(i, p)),
                2 => (0..len, payload()).prop_map(|(i, p)| Transition::InsertBeforeNth(i, p)),
                3 => (0..len).prop_map(Transition::DeleteNth),
                1 => Just(Transition::Clear),
            ]
            .boxed()
        }

        fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
            match transition {
                Transition::InsertAfterNth(i, _)
                | Transition::InsertBeforeNth(i, _)
                | Transition::DeleteNth(i) => *i < state.len(),
                Transition::Append(_) | Transition::Prepend(_) | Transition::Clear => true,
            }
        }

        fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
            match transition {
                Transition::Append(value) => state.push_back(value.clone()),
                Transition::Prepend(value) => state.push_front(value.clone()),
                Transition::InsertAfterNth(i, value) => state.insert(*i + 1, value.clone()),
                Transition::InsertBeforeNth(i, value) => state.insert(*i, value.clone()),
                Transition::DeleteNth(i) => {
                    state.remove(*i);
                }
                Transition::Clear => state.clear(),
            }
            state
        }
    }

    impl StateMachineTest for List {
        type SystemUnderTest = Self;
        type Reference = ListStateMachine;

        fn init_test(
            _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        ) -> Self::SystemUnderTest {
            List::new()
        }

        fn apply(
            mut state: Self::SystemUnderTest,
            _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
            transition: Transition,
        ) -> Self::SystemUnderTest {
            fn seek(ll: &mut List, nth: usize) -> CursorMut<'_> {
                let mut cursor = ll.forward_cursor_mut();
                for _ in 0..=nth {
                    cursor.next().expect("reference and list disagree on length");
                }
                cursor
            }

            match transition {
                Transition::Append(value) => state.append(&value).unwrap(),
                Transition::Prepend(value) => state.prepend(&value).unwrap(),
                Transition::InsertAfterNth(i, value) => {
                    seek(&mut state, i).insert_after(&value).unwrap()
                }
                Transition::InsertBeforeNth(i, value) => {
                    seek(&mut state, i).insert_before(&value).unwrap()
                }
                Transition::DeleteNth(i) => {
                    seek(&mut state, i).delete_current().unwrap();
                }
                Transition::Clear => state.clear(),
            }
            state
        }

        fn check_invariants(
            state: &Self::SystemUnderTest,
            ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        ) {
            let expected: Vec<Vec<u8>> = ref_state.iter().cloned().collect();
            assert_linked(state, &expected);
        }
    }
}
