//! Video and comment query builders

use super::types::{
    CommentFilter, Condition, ConditionGroup, FieldName, Mode, QueryFilter, VideoFilter,
    COMMENT_CURSOR_CEILING, MAX_PAGE_SIZE,
};
use crate::error::{Error, Result};
use crate::pagination::PageQuery;
use chrono::NaiveDate;
use tracing::warn;

/// Date format accepted by the research API
const DATE_FORMAT: &str = "%Y%m%d";

/// Builder for video search queries
///
/// ```
/// use tiktok_research::query::{Mode, VideoQueryBuilder};
///
/// let query = VideoQueryBuilder::new(Mode::Username, ["nasa"], "20240101", "20240131")
///     .filter_hashtags(["space"])
///     .regions(["US"])
///     .build()
///     .unwrap();
/// assert_eq!(query.max_count, 100);
/// ```
#[derive(Debug, Clone)]
pub struct VideoQueryBuilder {
    mode: Mode,
    entities: Vec<String>,
    start_date: String,
    end_date: String,
    filter_hashtags: Vec<String>,
    regions: Vec<String>,
    page_size: u32,
    result_ceiling: Option<usize>,
}

impl VideoQueryBuilder {
    /// Start a query for the given entities and inclusive date range
    pub fn new<I, S>(
        mode: Mode,
        entities: I,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode,
            entities: clean(entities),
            start_date: start_date.into(),
            end_date: end_date.into(),
            filter_hashtags: Vec::new(),
            regions: Vec::new(),
            page_size: MAX_PAGE_SIZE,
            result_ceiling: None,
        }
    }

    /// Start a query from a textual mode such as `"username"`
    pub fn parse<I, S>(
        mode: &str,
        entities: I,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(mode.parse()?, entities, start_date, end_date))
    }

    /// Only keep videos carrying one of these hashtags (username mode)
    #[must_use]
    pub fn filter_hashtags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_hashtags = clean(tags);
        self
    }

    /// Only keep videos from these region codes
    #[must_use]
    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = clean(regions);
        self
    }

    /// Items requested per page, clamped to `1..=100`
    #[must_use]
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Stop once at least this many items were fetched
    #[must_use]
    pub fn result_ceiling(mut self, ceiling: Option<usize>) -> Self {
        self.result_ceiling = ceiling;
        self
    }

    /// Selection mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Cleaned entity list
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// First day of the range
    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    /// Last day of the range
    pub fn end_date(&self) -> &str {
        &self.end_date
    }

    /// Entities joined the way they appear in logs and file names
    pub fn entity_label(&self) -> String {
        self.entities.join("-")
    }

    /// Validate the inputs and produce the first page query
    pub fn build(&self) -> Result<PageQuery> {
        validate_range(&self.start_date, &self.end_date)?;

        let mut conditions = Vec::new();
        match self.mode {
            Mode::Username => {
                if self.entities.len() != 1 {
                    return Err(Error::invalid_query(format!(
                        "username mode takes exactly one account, got {}",
                        self.entities.len()
                    )));
                }
                conditions.push(Condition::is_in(FieldName::Username, self.entities.clone()));
                if !self.filter_hashtags.is_empty() {
                    conditions.push(Condition::is_in(
                        FieldName::HashtagName,
                        self.filter_hashtags.clone(),
                    ));
                }
            }
            Mode::Hashtag => {
                if self.entities.is_empty() {
                    return Err(Error::invalid_query(
                        "hashtag mode takes at least one hashtag",
                    ));
                }
                if !self.filter_hashtags.is_empty() {
                    warn!(
                        filter = ?self.filter_hashtags,
                        "Hashtag filter ignored in hashtag mode"
                    );
                }
                conditions.push(Condition::is_in(
                    FieldName::HashtagName,
                    self.entities.clone(),
                ));
            }
        }

        if !self.regions.is_empty() {
            conditions.push(Condition::is_in(FieldName::RegionCode, self.regions.clone()));
        }

        let filter = QueryFilter::Video(VideoFilter {
            query: ConditionGroup { and: conditions },
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        });

        Ok(PageQuery::new(filter)
            .with_page_size(self.page_size)
            .with_result_ceiling(self.result_ceiling))
    }
}

/// Query for all comments on one video
///
/// The comment endpoint stops serving at cursor 1000, so the query carries
/// that ceiling.
pub fn comment_query(video_id: &str) -> Result<PageQuery> {
    let video_id = video_id.trim();
    if video_id.is_empty() {
        return Err(Error::invalid_query("video id must not be empty"));
    }

    Ok(PageQuery::new(QueryFilter::Comment(CommentFilter {
        video_id: video_id.to_string(),
    }))
    .with_cursor_ceiling(COMMENT_CURSOR_CEILING))
}

fn validate_range(start: &str, end: &str) -> Result<()> {
    let start_day = parse_date(start)?;
    let end_day = parse_date(end)?;
    if start_day > end_day {
        return Err(Error::invalid_query(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    // chrono accepts a sign and extra digits for %Y, the API does not
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_query(format!(
            "date '{value}' is not in YYYYMMDD format"
        )));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| Error::invalid_query(format!("date '{value}' is invalid: {e}")))
}

fn clean<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(|v| v.into().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
