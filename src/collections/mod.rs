pub mod linked_list;

pub use linked_list::{
    AllocError, AtBoundary, Cursor, CursorError, CursorMut, CursorResult, Direction,
    InvalidState, List,
};
