//! Query builders
//!
//! Pure functions from entities, a date range and optional filters to a
//! [`PageQuery`](crate::pagination::PageQuery).
//!
//! Videos can be selected either by a single account (`username` mode)
//! or by one or more hashtags (`hashtag_name` mode). Secondary filters are
//! appended as extra AND conditions, and only when they are non-empty.

mod builder;
mod types;

pub use builder::{comment_query, VideoQueryBuilder};
pub use types::{
    CommentFilter, Condition, ConditionGroup, FieldName, Mode, Operation, QueryFilter,
    VideoFilter, COMMENT_CURSOR_CEILING, COMMENT_FIELDS, MAX_PAGE_SIZE, VIDEO_FIELDS,
};
