//! Domain services exposed over gRPC, each with its REST gateway routes.

pub mod station;
pub mod user;

pub use station::StationServer;
pub use user::UserServer;

use lastmile_core::{PageToken, Record, RecordStore, RequestContext};
use tonic::Status;

use super::status::store_status;

/// Page size used when a list request leaves it at zero.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Largest page a single list call returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Resolves a list request's `page_size` and `page_token` into the store's
/// `(offset, limit)` window.
pub(crate) fn page_window(page_size: i32, page_token: &str) -> Result<(i64, i64), Status> {
    if page_size < 0 {
        return Err(Status::invalid_argument("page_size must be positive"));
    }
    let limit = match i64::from(page_size) {
        0 => DEFAULT_PAGE_SIZE,
        size => size.min(MAX_PAGE_SIZE),
    };
    let offset = PageToken::decode(page_token).map_err(store_status)?;
    Ok((offset, limit))
}

/// Validates and stores a new record, returning it as stored.
pub(crate) async fn create_record<R, S>(store: &S, ctx: &RequestContext, record: R) -> Result<R, Status>
where
    R: Record,
    S: RecordStore<R>,
{
    record.validate().map_err(store_status)?;
    store.create(ctx, &record).await.map_err(store_status)?;
    Ok(record)
}

/// Looks up a record by its trimmed id; `field` names the id in the
/// error message when it is blank.
pub(crate) async fn fetch_record<R, S>(
    store: &S,
    ctx: &RequestContext,
    field: &'static str,
    id: &str,
) -> Result<R, Status>
where
    R: Record,
    S: RecordStore<R>,
{
    let id = id.trim();
    if id.is_empty() {
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    store.get(ctx, id).await.map_err(store_status)
}

/// Lists one page, returning the records and the next page token.
pub(crate) async fn list_records<R, S>(
    store: &S,
    ctx: &RequestContext,
    page_size: i32,
    page_token: &str,
) -> Result<(Vec<R>, String), Status>
where
    R: Record,
    S: RecordStore<R>,
{
    let (offset, limit) = page_window(page_size, page_token)?;
    let page = store.list(ctx, offset, limit).await.map_err(store_status)?;
    let next_page_token = page.next_token();
    Ok((page.items, next_page_token))
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;

    #[test]
    fn page_size_defaults_and_caps() {
        assert_eq!(page_window(0, "").unwrap(), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(page_window(7, "14").unwrap(), (14, 7));
        assert_eq!(page_window(1_000, " 3 ").unwrap(), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn rejects_negative_size_and_bad_tokens() {
        let status = page_window(-1, "").unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "page_size must be positive");

        for token in ["abc", "-5", "1.5"] {
            let status = page_window(10, token).unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
            assert_eq!(status.message(), "invalid page_token");
        }
    }
}
