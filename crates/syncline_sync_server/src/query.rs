//! Paged changed-since reads from the remote store.

use syncline_storage::{IndexKey, IndexQuery, RemoteItem, RemoteStore, StorageError, StorageResult};
use syncline_sync_protocol::Timestamp;

/// Where a response page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStart {
    /// Resume strictly after a continuation key.
    After(IndexKey),
    /// Skip `page * page_size` rows from the start of the result set.
    Offset(u32),
}

/// One response page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Rows in `(updated_at, id)` order.
    pub items: Vec<RemoteItem>,
    /// Key of the last row, present iff more rows follow.
    pub next: Option<IndexKey>,
}

impl ResultPage {
    /// Returns true if more rows follow this page.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Reads the page of rows of `entity_type` changed after `updated_after`.
///
/// Store pages are consumed until `page_size` rows are held or the store is
/// exhausted. Offset starts stream through the skipped rows `scan_size` at a
/// time without retaining them.
pub fn read_page<R: RemoteStore + ?Sized>(
    store: &R,
    entity_type: &str,
    updated_after: Option<Timestamp>,
    start: PageStart,
    page_size: usize,
    scan_size: usize,
) -> StorageResult<ResultPage> {
    let base = IndexQuery::changed_since(entity_type, updated_after);
    let page_size = page_size.max(1);

    let mut cursor = match start {
        PageStart::After(key) => Some(key),
        PageStart::Offset(page) => {
            let skip = (page as usize).saturating_mul(page_size);
            match skip_rows(store, &base, skip, scan_size.max(1))? {
                Skipped::Exhausted => return Ok(ResultPage::default()),
                Skipped::At(key) => key,
            }
        }
    };

    let mut items = Vec::with_capacity(page_size.min(1024));
    while items.len() < page_size {
        let query = base
            .clone()
            .starting_after(cursor.clone())
            .with_limit(page_size - items.len());
        let chunk = store.query(&query)?;

        if chunk.items.is_empty() && chunk.last_evaluated_key.is_some() {
            return Err(StorageError::Corrupted(
                "store returned an empty page with a continuation key".into(),
            ));
        }
        items.extend(chunk.items);

        match chunk.last_evaluated_key {
            Some(key) => cursor = Some(key),
            None => return Ok(ResultPage { items, next: None }),
        }
    }

    Ok(ResultPage {
        items,
        next: cursor,
    })
}

enum Skipped {
    Exhausted,
    At(Option<IndexKey>),
}

fn skip_rows<R: RemoteStore + ?Sized>(
    store: &R,
    base: &IndexQuery,
    mut remaining: usize,
    scan_size: usize,
) -> StorageResult<Skipped> {
    let mut cursor = None;
    while remaining > 0 {
        let query = base
            .clone()
            .starting_after(cursor)
            .with_limit(remaining.min(scan_size));
        let chunk = store.query(&query)?;
        remaining = remaining.saturating_sub(chunk.items.len());

        match chunk.last_evaluated_key {
            Some(key) if !chunk.items.is_empty() => cursor = Some(key),
            _ => return Ok(Skipped::Exhausted),
        }
    }
    Ok(Skipped::At(cursor))
}
