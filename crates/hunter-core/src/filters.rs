//! Query and metadata-filter value types.
//!
//! These are plain data: parsing them from an external wire format (JSON,
//! form fields, ...) is left to whatever sits in front of the engine.

use crate::frame::VideoFrame;
use crate::ids::{FrameId, Hour, Weekday};

/// Time-of-day filter, `[from, to)` in hours. Defaults to the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    /// Inclusive lower bound, in `[0, 24)`.
    pub from: Hour,
    /// Exclusive upper bound, in `[0, 24]`.
    pub to: Hour,
}

impl Default for TimeFilter {
    fn default() -> Self {
        Self {
            from: Hour::new(0),
            to: Hour::new(24),
        }
    }
}

impl TimeFilter {
    /// Whether `hour` falls inside `[from, to)`.
    #[must_use]
    pub fn matches(&self, hour: Hour) -> bool {
        hour.get() >= self.from.get() && hour.get() < self.to.get()
    }

    /// Whether this filter is the default, whole-day range.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Day-of-week filter: a per-weekday inclusion mask, defaulting to every
/// day enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekDaysFilter([bool; 7]);

impl Default for WeekDaysFilter {
    fn default() -> Self {
        Self([true; 7])
    }
}

impl WeekDaysFilter {
    /// Builds a filter from the low 7 bits of `mask` (bit `i` enables
    /// weekday `i`).
    #[must_use]
    pub fn from_bitmask(mask: u8) -> Self {
        let mut days = [false; 7];
        for (i, day) in days.iter_mut().enumerate() {
            *day = mask & (1 << i) != 0;
        }
        Self(days)
    }

    /// Whether `day` is enabled.
    #[must_use]
    pub fn matches(&self, day: Weekday) -> bool {
        self.0.get(day.get() as usize).copied().unwrap_or(false)
    }

    /// Whether this filter is the default, every-day-enabled mask.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Metadata filters applied before a rescore: time of day and day of week.
/// Frames with no metadata always pass (filters only constrain frames that
/// carry the relevant field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filters {
    /// Time-of-day constraint.
    pub time: TimeFilter,
    /// Day-of-week constraint.
    pub days: WeekDaysFilter,
}

impl Filters {
    /// Whether both sub-filters are at their default, match-everything
    /// value.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.time.is_default() && self.days.is_default()
    }

    /// Whether `frame` passes both constraints.
    #[must_use]
    pub fn matches(&self, frame: &VideoFrame) -> bool {
        match &frame.metadata {
            Some(meta) => self.time.matches(meta.hour) && self.days.matches(meta.weekday),
            None => true,
        }
    }
}

/// Axis-aligned rectangle in `[0, 1]` normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeRect {
    /// Left edge, normalized.
    pub left: f32,
    /// Top edge, normalized.
    pub top: f32,
    /// Right edge, normalized.
    pub right: f32,
    /// Bottom edge, normalized.
    pub bottom: f32,
}

impl RelativeRect {
    /// Normalized width (`right - left`).
    #[must_use]
    pub fn width_norm(&self) -> f32 {
        self.right - self.left
    }

    /// Normalized height (`bottom - top`).
    #[must_use]
    pub fn height_norm(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area of the intersection between `self` and `other`, or `0.0` if
    /// they don't overlap.
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f32 {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        let top = self.top.max(other.top);
        let bottom = self.bottom.min(other.bottom);
        if right > left && bottom > top {
            (right - left) * (bottom - top)
        } else {
            0.0
        }
    }

    /// Intersection-over-union against `other`.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.width_norm() * self.height_norm() + other.width_norm() * other.height_norm() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One canvas subquery: a region of interest paired with either a
/// free-text description or a bitmap sketch.
///
/// Equality and hashing are defined entirely on content (the rect plus
/// the text or pixel payload) -- never on a generated filename -- so that
/// two semantically identical canvas queries built at different times
/// compare equal and the "unchanged since last rescore" cache check in
/// [`crate::context::SearchContext`] actually fires.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasSubquery {
    /// A described region, ranked the same way a text query is.
    Text {
        /// Region of interest.
        rect: RelativeRect,
        /// Free-text description of what should appear there.
        text: String,
    },
    /// A sketched region, ranked by visual similarity to the pixels.
    Bitmap {
        /// Region of interest.
        rect: RelativeRect,
        /// Number of color channels in `pixels`.
        channels: u8,
        /// Bitmap width in pixels.
        width: u32,
        /// Bitmap height in pixels.
        height: u32,
        /// Raw pixel bytes, `height * width * channels` long.
        pixels: Vec<u8>,
    },
}

impl CanvasSubquery {
    /// The region of interest common to both variants.
    #[must_use]
    pub fn rect(&self) -> RelativeRect {
        match self {
            Self::Text { rect, .. } | Self::Bitmap { rect, .. } => *rect,
        }
    }
}

/// A full canvas query: an ordered collection of regions for one temporal
/// slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasQuery {
    subqueries: Vec<CanvasSubquery>,
}

impl CanvasQuery {
    /// An empty canvas query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text subquery.
    pub fn push_text(&mut self, rect: RelativeRect, text: String) {
        self.subqueries.push(CanvasSubquery::Text { rect, text });
    }

    /// Appends a bitmap subquery.
    pub fn push_bitmap(&mut self, rect: RelativeRect, channels: u8, width: u32, height: u32, pixels: Vec<u8>) {
        self.subqueries.push(CanvasSubquery::Bitmap {
            rect,
            channels,
            width,
            height,
            pixels,
        });
    }

    /// Number of subqueries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subqueries.len()
    }

    /// Whether there are no subqueries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subqueries.is_empty()
    }

    /// All subqueries, in insertion order.
    #[must_use]
    pub fn subqueries(&self) -> &[CanvasSubquery] {
        &self.subqueries
    }
}

/// A single query issued against one temporal slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalQuery {
    /// Free-text query for this slot, if any.
    pub text: Option<String>,
    /// Canvas/region query for this slot, if any.
    pub canvas: Option<CanvasQuery>,
    /// Relocation/k-NN seed frame for this slot, if any.
    pub relocation: Option<FrameId>,
}

impl TemporalQuery {
    /// Whether this slot carries no query content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.as_ref().map(String::is_empty).unwrap_or(true)
            && self.canvas.as_ref().map(CanvasQuery::is_empty).unwrap_or(true)
            && self.relocation.is_none()
    }
}

/// A full query: one or more temporal slots, relevance feedback, and
/// metadata filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Ordered temporal slots (index 0 first, etc.), each carrying its
    /// own text/canvas/relocation content.
    pub temporal: Vec<TemporalQuery>,
    /// Frame ids liked so far this context, fed to relevance feedback.
    pub likes: Vec<FrameId>,
    /// Metadata filters to apply.
    pub filters: Filters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_filter_default_covers_whole_day() {
        let f = TimeFilter::default();
        assert!(f.matches(Hour::new(0)));
        assert!(f.matches(Hour::new(23)));
        assert!(f.is_default());
    }

    #[test]
    fn week_days_filter_from_bitmask() {
        let f = WeekDaysFilter::from_bitmask(0b0000011);
        assert!(f.matches(Weekday::new(0)));
        assert!(f.matches(Weekday::new(1)));
        assert!(!f.matches(Weekday::new(2)));
    }

    #[test]
    fn identical_content_canvas_queries_are_equal_regardless_of_construction_time() {
        let mut a = CanvasQuery::new();
        a.push_text(
            RelativeRect { left: 0.0, top: 0.0, right: 0.5, bottom: 0.5 },
            "a dog".into(),
        );
        let mut b = CanvasQuery::new();
        b.push_text(
            RelativeRect { left: 0.0, top: 0.0, right: 0.5, bottom: 0.5 },
            "a dog".into(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn iou_of_identical_rects_is_one() {
        let r = RelativeRect { left: 0.0, top: 0.0, right: 0.5, bottom: 0.5 };
        assert!((r.iou(&r) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_rects_is_zero() {
        let a = RelativeRect { left: 0.0, top: 0.0, right: 0.2, bottom: 0.2 };
        let b = RelativeRect { left: 0.8, top: 0.8, right: 1.0, bottom: 1.0 };
        assert_eq!(a.iou(&b), 0.0);
    }
}
