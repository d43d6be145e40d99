//! "Fetch every page" loop shared by all collection fetches.

use std::future::Future;

use tracing::debug;

use crate::api::types::PagedResult;

/// Fetch pages starting at 1 until the server reports the last one, and
/// return all items in page order.
///
/// Termination relies entirely on the server's `totalPageCount`; there is no
/// iteration cap.
pub async fn fetch_all_pages<T, E, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, E>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<PagedResult<T>, E>>,
{
  let mut items = Vec::new();
  let mut page_number = 1u32;

  loop {
    let page = fetch_page(page_number).await?;
    debug!(
      page = page.current_page,
      total = page.total_page_count,
      count = page.items.len(),
      "Fetched page"
    );

    let is_last = page.is_last();
    items.extend(page.items);

    if is_last {
      break;
    }
    page_number += 1;
  }

  Ok(items)
}
