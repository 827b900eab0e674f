//! Offset pagination over a store's ascending-key total order.
//!
//! A page position is a plain numeric offset. On the wire it travels as an
//! opaque continuation token: the decimal offset, or the empty string for
//! both "first page" (request) and "no more pages" (response).

use crate::error::StoreError;

/// A validated `(offset, limit)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Validates a raw window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `offset < 0` or `limit <= 0`.
    pub fn new(offset: i64, limit: i64) -> Result<Self, StoreError> {
        if offset < 0 {
            return Err(StoreError::invalid("offset must not be negative"));
        }
        if limit <= 0 {
            return Err(StoreError::invalid("limit must be positive"));
        }
        let offset = usize::try_from(offset).map_err(|_| StoreError::invalid("offset too large"))?;
        let limit = usize::try_from(limit).map_err(|_| StoreError::invalid("limit too large"))?;
        Ok(Self { offset, limit })
    }

    /// Index one past the last position this window can cover, saturating.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.limit)
    }
}

/// One page of records plus the position of the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub items: Vec<R>,
    /// Offset of the first record after this page, or `None` at the end.
    pub next_offset: Option<usize>,
}

impl<R> Page<R> {
    /// An empty page that terminates enumeration.
    #[must_use]
    pub fn end() -> Self {
        Self {
            items: Vec::new(),
            next_offset: None,
        }
    }

    /// Continuation token for the next page (empty at the end).
    #[must_use]
    pub fn next_token(&self) -> String {
        PageToken::encode(self.next_offset)
    }
}

/// Computes the next-page offset after returning `returned` positions from
/// `offset` in an order of `total` entries.
///
/// `returned` counts positions consumed from the order, which for the cache
/// backend may exceed the number of records actually decoded.
#[must_use]
pub fn next_offset(offset: usize, returned: usize, total: usize) -> Option<usize> {
    let end = offset.saturating_add(returned);
    (end < total).then_some(end)
}

/// Encoding of page offsets as continuation tokens.
pub struct PageToken;

impl PageToken {
    /// Encodes a next offset; `None` becomes the empty end-of-list token.
    #[must_use]
    pub fn encode(next: Option<usize>) -> String {
        next.map(|offset| offset.to_string()).unwrap_or_default()
    }

    /// Decodes a request token; the empty token is offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for anything other than an
    /// empty string or a non-negative decimal integer.
    pub fn decode(token: &str) -> Result<i64, StoreError> {
        if token.is_empty() {
            return Ok(0);
        }
        match token.parse::<i64>() {
            Ok(offset) if offset >= 0 => Ok(offset),
            _ => Err(StoreError::invalid("invalid page_token")),
        }
    }
}
