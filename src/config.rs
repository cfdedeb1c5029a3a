use crate::{align_down, align_up, block::OVERHEAD, error::HeapError};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// Smallest accepted page size. Alignment padding may be pushed a whole page
/// forward, so a page must comfortably hold a header+footer pair.
pub const MIN_PAGE_SIZE: usize = 2 * OVERHEAD;

/// Bounds and tuning of a heap region.
///
/// `start`, `end` and `max` are addresses in the region's address space.
/// They should be page-aligned; if they aren't, `start` is rounded up and
/// `end`/`max` are rounded down, wasting the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  pub start: usize,
  pub end: usize,
  pub max: usize,
  pub page_size: usize,
  /// The region never contracts below this size on its own. Defaults to the
  /// initial size `end - start`.
  pub min_size: Option<usize>,
}

/// Validated, page-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bounds {
  pub start: usize,
  pub end: usize,
  pub max: usize,
  pub floor: usize,
  pub page_size: usize,
}

impl HeapConfig {
  pub fn new(
    start: usize,
    end: usize,
    max: usize,
  ) -> Self {
    Self {
      start,
      end,
      max,
      page_size: DEFAULT_PAGE_SIZE,
      min_size: None,
    }
  }

  pub fn with_page_size(
    mut self,
    page_size: usize,
  ) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn with_min_size(
    mut self,
    min_size: usize,
  ) -> Self {
    self.min_size = Some(min_size);
    self
  }

  pub(crate) fn validate(&self) -> Result<Bounds, HeapError> {
    let page = self.page_size;
    if !page.is_power_of_two() || page < MIN_PAGE_SIZE {
      return Err(HeapError::InvalidConfig(
        "page size must be a power of two of at least 64 bytes",
      ));
    }

    let invalid = HeapError::InvalidBounds {
      start: self.start,
      end: self.end,
      max: self.max,
    };

    let start = self.start.checked_add(page - 1).map(|v| align_down!(v, page));
    let Some(start) = start else {
      return Err(invalid);
    };
    let end = align_down!(self.end, page);
    let max = align_down!(self.max, page);

    if start > end || end > max {
      return Err(invalid);
    }

    let min_size = self.min_size.unwrap_or(end - start);
    if min_size > max - start {
      return Err(invalid);
    }
    let floor = start + align_up!(min_size, page);

    Ok(Bounds {
      start,
      end,
      max,
      floor,
      page_size: page,
    })
  }
}
