//! Filter expression types
//!
//! These serialize directly into the research API request body.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest page the research API will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Fields requested for every video
pub const VIDEO_FIELDS: &str = "id,video_description,create_time,region_code,share_count,\
view_count,like_count,comment_count,music_id,hashtag_names,username,effect_ids,playlist_id,\
voice_to_text";

/// Fields requested for every comment
pub const COMMENT_FIELDS: &str =
    "id,video_id,text,like_count,reply_count,parent_comment_id,create_time";

/// The comment endpoint refuses cursors at or beyond this position
pub const COMMENT_CURSOR_CEILING: u64 = 1000;

/// How the entities of a video query are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// A single account
    #[serde(rename = "username")]
    Username,
    /// One or more hashtags
    #[serde(rename = "hashtag_name")]
    Hashtag,
}

impl Mode {
    /// Wire name of the mode
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Username => "username",
            Mode::Hashtag => "hashtag_name",
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "username" => Ok(Mode::Username),
            "hashtag_name" | "hashtag" => Ok(Mode::Hashtag),
            other => Err(Error::invalid_mode(other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Field value is one of the listed values
    In,
    /// Field value equals the single listed value
    Eq,
}

/// Queryable video field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    /// Account handle
    Username,
    /// Hashtag without the `#`
    HashtagName,
    /// Two-letter region code
    RegionCode,
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Operator
    pub operation: Operation,
    /// Field the condition applies to
    pub field_name: FieldName,
    /// Values to compare against
    pub field_values: Vec<String>,
}

impl Condition {
    /// `field IN values`
    pub fn is_in(field_name: FieldName, values: Vec<String>) -> Self {
        Self {
            operation: Operation::In,
            field_name,
            field_values: values,
        }
    }
}

/// Conditions that must all hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// AND-ed conditions
    pub and: Vec<Condition>,
}

/// Filter part of a video query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFilter {
    /// Filter expression
    pub query: ConditionGroup,
    /// First day, `YYYYMMDD`
    pub start_date: String,
    /// Last day, `YYYYMMDD`
    pub end_date: String,
}

/// Filter part of a comment query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentFilter {
    /// Video whose comments are listed
    pub video_id: String,
}

/// Entity-specific part of a paginated request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryFilter {
    /// Video search
    Video(VideoFilter),
    /// Comment listing
    Comment(CommentFilter),
}
